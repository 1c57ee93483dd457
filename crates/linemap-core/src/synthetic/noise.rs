//! Deterministic noise for synthetic detections.
//!
//! Avoids `thread_rng` and any dependence on `rand`'s internal algorithms so
//! datasets stay stable across versions and platforms.

use crate::{Real, Segment2d, Vec2};

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UniformPixelNoise {
    pub seed: u64,
    /// Maximum absolute per-axis noise (pixels).
    pub max_abs_px: Real,
}

impl UniformPixelNoise {
    /// Noise vector for the key `(image_idx, item_idx)`.
    pub fn sample(&self, image_idx: usize, item_idx: usize) -> Vec2 {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vec2::zeros();
        }
        let key = mix_key(self.seed, image_idx, item_idx);
        let u = unit(splitmix64(key));
        let v = unit(splitmix64(key ^ 0x94D0_49BB_1331_11EB));
        Vec2::new((u - 0.5) * 2.0 * max_abs, (v - 0.5) * 2.0 * max_abs)
    }

    /// Perturb both endpoints of a detection independently.
    pub fn perturb_segment(&self, image_idx: usize, seg_idx: usize, seg: &Segment2d) -> Segment2d {
        Segment2d::new(
            seg.p0 + self.sample(image_idx, 2 * seg_idx),
            seg.p1 + self.sample(image_idx, 2 * seg_idx + 1),
        )
    }
}

fn mix_key(seed: u64, image_idx: usize, item_idx: usize) -> u64 {
    seed ^ (image_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (item_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Top 53 bits as a double in `[0, 1)`.
fn unit(x: u64) -> Real {
    (x >> 11) as Real * (1.0 / ((1u64 << 53) as Real))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic_and_bounded() {
        let noise = UniformPixelNoise {
            seed: 9,
            max_abs_px: 0.5,
        };
        let seg = Segment2d::from_coords(10.0, 10.0, 50.0, 20.0);
        let a = noise.perturb_segment(1, 3, &seg);
        let b = noise.perturb_segment(1, 3, &seg);
        assert_eq!(a, b);
        assert_ne!(a, noise.perturb_segment(1, 4, &seg));
        assert!((a.p0 - seg.p0).amax() <= 0.5);
    }
}
