//! Deterministic, model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac_fit`] with the data
//! and [`RansacOptions`]. The sampler is seeded, so identical inputs and
//! options always produce the same consensus set.
//!
//! When no consensus is found, [`ransac_fit`] returns a [`RansacResult`] with
//! `success == false` and `model == None` instead of panicking.

use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration parameters for the RANSAC loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RansacOptions {
    /// Maximum number of hypotheses drawn.
    pub max_iters: usize,
    /// Inlier residual threshold, in the units returned by [`Estimator::residual`].
    pub thresh: f64,
    /// Minimum number of inliers required to accept a model.
    pub min_inliers: usize,
    /// Desired confidence in `[0, 1]` used for adaptive early stopping.
    pub confidence: f64,
    /// Sampler seed.
    pub seed: u64,
    /// Refit on the consensus set before scoring.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            thresh: 1.0,
            min_inliers: 2,
            confidence: 0.99,
            seed: 0,
            refit_on_inliers: true,
        }
    }
}

/// Output of a RANSAC run.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub success: bool,
    pub model: Option<M>,
    /// Indices of inlier data points, ascending.
    pub inliers: Vec<usize>,
    /// Root-mean-square residual over inliers.
    pub inlier_rms: f64,
    /// Iteration at which the best model was found.
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            success: false,
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

impl<M> RansacResult<M> {
    /// Fraction of `total` data points that ended up as inliers.
    pub fn inlier_ratio(&self, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        self.inliers.len() as f64 / total as f64
    }
}

/// Model estimator used by [`ransac_fit`].
///
/// Estimators take `&self` so they can carry per-call context (noise scales,
/// camera parameters) alongside the data.
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal number of samples needed to hypothesize a model.
    const MIN_SAMPLES: usize;

    /// Fit a model from a minimal sample. `None` if the sample is degenerate.
    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum, same units as `RansacOptions::thresh`.
    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64;

    fn is_degenerate(&self, _data: &[Self::Datum], _sample: &[usize]) -> bool {
        false
    }

    /// Least-squares refit on the consensus set. Default: keep the hypothesis.
    fn refit(&self, _data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

struct Consensus {
    inliers: Vec<usize>,
    rms: f64,
}

impl Consensus {
    fn beats(&self, best: &RansacResult<impl Sized>) -> bool {
        !best.success
            || self.inliers.len() > best.inliers.len()
            || (self.inliers.len() == best.inliers.len() && self.rms < best.inlier_rms)
    }
}

fn score<E: Estimator>(
    estimator: &E,
    model: &E::Model,
    data: &[E::Datum],
    thresh: f64,
) -> Consensus {
    let mut inliers = Vec::with_capacity(data.len());
    let mut sq_sum = 0.0;
    for (i, datum) in data.iter().enumerate() {
        let r = estimator.residual(model, datum);
        if r.is_finite() && r <= thresh {
            inliers.push(i);
            sq_sum += r * r;
        }
    }
    let rms = if inliers.is_empty() {
        f64::INFINITY
    } else {
        (sq_sum / inliers.len() as f64).sqrt()
    };
    Consensus { inliers, rms }
}

/// Adaptive iteration bound `log(1 - p) / log(1 - w^m)`, clamped to the
/// iterations already spent and the configured maximum.
fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let needed = ((1.0 - confidence.min(1.0 - 1e-12)).ln() / denom).ceil() as usize;
    needed.clamp(iters_so_far, max_iters)
}

/// Run the RANSAC loop for `estimator` over `data`.
pub fn ransac_fit<E: Estimator>(
    estimator: &E,
    data: &[E::Datum],
    opts: &RansacOptions,
) -> RansacResult<E::Model> {
    let mut best: RansacResult<E::Model> = RansacResult::default();
    if data.len() < E::MIN_SAMPLES || E::MIN_SAMPLES == 0 {
        return best;
    }

    let all_indices: Vec<usize> = (0..data.len()).collect();
    let mut sample = vec![0usize; E::MIN_SAMPLES];
    let mut rng = StdRng::seed_from_u64(opts.seed);

    let mut budget = opts.max_iters;
    let mut iter = 0;
    while iter < budget {
        iter += 1;
        for (slot, &idx) in all_indices
            .choose_multiple(&mut rng, E::MIN_SAMPLES)
            .enumerate()
        {
            sample[slot] = idx;
        }

        if estimator.is_degenerate(data, &sample) {
            continue;
        }
        let Some(hypothesis) = estimator.fit(data, &sample) else {
            continue;
        };

        let mut model = hypothesis;
        let mut consensus = score(estimator, &model, data, opts.thresh);
        if consensus.inliers.len() < opts.min_inliers.max(E::MIN_SAMPLES) {
            continue;
        }

        if opts.refit_on_inliers {
            if let Some(refined) = estimator.refit(data, &consensus.inliers) {
                let refined_consensus = score(estimator, &refined, data, opts.thresh);
                if refined_consensus.inliers.len() >= opts.min_inliers {
                    model = refined;
                    consensus = refined_consensus;
                }
            }
        }

        let ratio = consensus.inliers.len() as f64 / data.len() as f64;
        if consensus.beats(&best) {
            best.success = true;
            best.model = Some(model);
            best.inlier_rms = consensus.rms;
            best.inliers = consensus.inliers;
            best.iters = iter;
        }

        budget = adaptive_iterations(opts.confidence, ratio, E::MIN_SAMPLES, iter, opts.max_iters);
    }

    best
}
