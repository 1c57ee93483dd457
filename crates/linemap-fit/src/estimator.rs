use crate::sampling::DepthSample;
use linemap_core::{Estimator, InfiniteLine3, Pt3};

/// RANSAC estimator for a 3D line through back-projected depth samples.
///
/// Residuals are point-to-line distances in units of each sample's own
/// metric sigma, so far samples are allowed proportionally more deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthLineEstimator;

impl Estimator for DepthLineEstimator {
    type Datum = DepthSample;
    type Model = InfiniteLine3;

    const MIN_SAMPLES: usize = 2;

    fn fit(&self, data: &[DepthSample], sample: &[usize]) -> Option<InfiniteLine3> {
        InfiniteLine3::through(&data[sample[0]].point, &data[sample[1]].point)
    }

    fn residual(&self, model: &InfiniteLine3, datum: &DepthSample) -> f64 {
        model.distance_to_point(&datum.point) / datum.sigma.max(f64::EPSILON)
    }

    fn is_degenerate(&self, _data: &[DepthSample], sample: &[usize]) -> bool {
        sample[0] == sample[1]
    }

    fn refit(&self, data: &[DepthSample], inliers: &[usize]) -> Option<InfiniteLine3> {
        let points: Vec<Pt3> = inliers.iter().map(|&i| data[i].point).collect();
        InfiniteLine3::fit_points(&points)
    }
}
