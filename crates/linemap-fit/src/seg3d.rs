use crate::estimator::DepthLineEstimator;
use crate::sampling::sample_depths;
use crate::FitError;
use linemap_core::{
    ransac_fit, CameraView, DepthMap, Pt2, RansacOptions, Real, Segment2d, Segment3d,
};
use serde::{Deserialize, Serialize};

/// Parameters of the per-segment depth fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Inlier threshold in units of per-sample sigma.
    pub ransac_th: Real,
    /// Required inlier fraction of the in-image samples, in `(0, 1]`.
    pub min_percentage_inliers: Real,
    /// 2D detection variance in squared pixels.
    pub var2d: Real,
    pub max_iters: usize,
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            ransac_th: 0.75,
            min_percentage_inliers: 0.9,
            var2d: 5.0,
            max_iters: 200,
            seed: 0,
        }
    }
}

/// Lift one 2D segment into a 3D segment using the depth map.
///
/// `seed_offset` decorrelates the sampler across segments while keeping the
/// result a pure function of the inputs.
pub fn estimate_seg3d_from_depth(
    seg: &Segment2d,
    depth: &DepthMap,
    view: &CameraView,
    opts: &FitOptions,
    seed_offset: u64,
) -> Result<Segment3d, FitError> {
    let samples = sample_depths(seg, view, depth, opts.var2d.sqrt());
    if samples.valid.len() < 2 {
        return Err(FitError::NotEnoughSamples(samples.valid.len()));
    }

    let required = ((opts.min_percentage_inliers * samples.num_in_image as Real).ceil() as usize).max(2);
    let ransac_opts = RansacOptions {
        max_iters: opts.max_iters,
        thresh: opts.ransac_th,
        min_inliers: required,
        confidence: 0.99,
        seed: opts.seed.wrapping_add(seed_offset),
        refit_on_inliers: true,
    };
    let res = ransac_fit(&DepthLineEstimator, &samples.valid, &ransac_opts);
    let Some(line) = res.model else {
        return Err(FitError::NoConsensus);
    };

    let support = res.inlier_ratio(samples.num_in_image);
    if support < opts.min_percentage_inliers {
        return Err(FitError::LowSupport {
            support,
            required: opts.min_percentage_inliers,
        });
    }

    let center = view.center();
    let endpoint = |i: usize, px: &Pt2| {
        line.closest_point_to_ray(&center, &view.ray_direction(px))
            .filter(|p| view.depth_of(p) > 0.0)
            .ok_or(FitError::EndpointRay(i))
    };
    let out = Segment3d::new(endpoint(0, &seg.p0)?, endpoint(1, &seg.p1)?);
    if out.is_degenerate() {
        return Err(FitError::Degenerate);
    }
    Ok(out)
}
