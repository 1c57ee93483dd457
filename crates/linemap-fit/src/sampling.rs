//! Depth sampling along a 2D segment.

use linemap_core::{CameraView, DepthMap, Pt2, Pt3, Real, Segment2d};

/// A pixel on the segment with a valid depth, lifted into the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSample {
    pub pixel: Pt2,
    pub depth: Real,
    pub point: Pt3,
    /// Expected metric uncertainty of `point` orthogonal to the viewing ray.
    pub sigma: Real,
}

/// Outcome of sampling one segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentSamples {
    /// Samples that fell inside the image, valid depth or not.
    pub num_in_image: usize,
    pub valid: Vec<DepthSample>,
}

/// Evenly spaced sample positions along `seg`: one per pixel of length,
/// endpoints included, never fewer than two.
pub fn sample_positions(seg: &Segment2d) -> Vec<Pt2> {
    let n = (seg.length().ceil() as usize).max(1) + 1;
    (0..n)
        .map(|i| {
            let t = i as Real / (n - 1) as Real;
            seg.p0 + (seg.p1 - seg.p0) * t
        })
        .collect()
}

/// Read depth at the nearest pixel of every sample position and back-project
/// the exact sub-pixel position at that depth.
///
/// `pixel_sigma` is the 2D detection standard deviation in pixels; the
/// metric sigma of a sample is `depth * pixel_sigma / f`.
pub fn sample_depths(
    seg: &Segment2d,
    view: &CameraView,
    depth: &DepthMap,
    pixel_sigma: Real,
) -> SegmentSamples {
    let focal = view.k.focal();
    let mut out = SegmentSamples::default();
    for pixel in sample_positions(seg) {
        if !view.contains(&pixel) {
            continue;
        }
        out.num_in_image += 1;
        let (x, y) = (pixel.x.round() as usize, pixel.y.round() as usize);
        let Some(d) = depth.get(x, y) else {
            continue;
        };
        out.valid.push(DepthSample {
            pixel,
            depth: d,
            point: view.backproject(&pixel, d),
            sigma: d * pixel_sigma / focal,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use linemap_core::{FxFyCxCySkew, Mat3, Vec3};

    fn view() -> CameraView {
        CameraView::new(
            FxFyCxCySkew::new(100.0, 100.0, 20.0, 10.0),
            Mat3::identity(),
            Vec3::zeros(),
            40,
            20,
        )
        .unwrap()
    }

    #[test]
    fn one_sample_per_pixel_with_endpoints() {
        let seg = Segment2d::from_coords(0.0, 0.0, 10.0, 0.0);
        let pos = sample_positions(&seg);
        assert_eq!(pos.len(), 11);
        assert_eq!(pos[0], seg.p0);
        assert_eq!(pos[10], seg.p1);

        let tiny = Segment2d::from_coords(3.0, 3.0, 3.2, 3.0);
        assert_eq!(sample_positions(&tiny).len(), 2);
    }

    #[test]
    fn out_of_image_samples_are_not_counted() {
        let seg = Segment2d::from_coords(30.0, 5.0, 50.0, 5.0);
        let depth = DepthMap::filled(40, 20, 2.0);
        let samples = sample_depths(&seg, &view(), &depth, 2.0);
        assert_eq!(samples.num_in_image, 10);
        assert_eq!(samples.valid.len(), 10);
        assert!((samples.valid[0].sigma - 0.04).abs() < 1e-12);
        assert!((samples.valid[0].point.z - 2.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_depth_is_skipped_but_counted() {
        let seg = Segment2d::from_coords(0.0, 5.0, 9.0, 5.0);
        let depth = DepthMap::from_fn(40, 20, |x, _| if x < 5 { 0.0 } else { 1.0 });
        let samples = sample_depths(&seg, &view(), &depth, 1.0);
        assert_eq!(samples.num_in_image, 10);
        assert_eq!(samples.valid.len(), 5);
    }
}
