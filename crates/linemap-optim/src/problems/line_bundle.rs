//! Joint refinement of track lines against their 2D observations.
//!
//! Each track contributes one 6D endpoint block. Every observation adds a
//! two-row line reprojection residual; an optional endpoint prior keeps the
//! otherwise free sliding of the endpoints along the line in check.

use crate::backend::{
    BackendSolution, BackendSolveOptions, OptimBackend, SolveReport, TinySolverBackend,
};
use crate::factors::line_reprojection::{line_reproj_residual, CameraData};
use crate::ir::{FactorKind, ProblemIR, ResidualBlock, RobustLoss};
use anyhow::{anyhow, ensure, Result};
use linemap_core::{LineReconstruction, LineTrack, Pt3, Segment3d};
use log::{info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Solve options for line bundle adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineBundleOptions {
    /// Robust loss applied to reprojection residuals.
    pub loss: RobustLoss,
    /// Weight of every reprojection residual.
    pub obs_weight: f64,
    /// Weight of the endpoint prior. `0` disables it.
    pub prior_weight: f64,
    /// Indices of tracks kept fixed.
    pub fix_tracks: Vec<usize>,
}

impl Default for LineBundleOptions {
    fn default() -> Self {
        Self {
            loss: RobustLoss::Huber { scale: 1.0 },
            obs_weight: 1.0,
            prior_weight: 1e-2,
            fix_tracks: Vec::new(),
        }
    }
}

/// Result of line bundle adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineBundleEstimate {
    pub reconstruction: LineReconstruction,
    pub report: SolveReport,
}

/// Reprojection statistics of a reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineBundleStats {
    /// Mean absolute endpoint-to-line distance over all observations, pixels.
    pub mean_line_error: f64,
    /// Per-track mean of the same quantity.
    pub per_track_errors: Vec<f64>,
}

fn track_param_name(k: usize) -> String {
    format!("track_{k}")
}

fn pack_segment(seg: &Segment3d) -> DVector<f64> {
    DVector::from_vec(vec![seg.p0.x, seg.p0.y, seg.p0.z, seg.p1.x, seg.p1.y, seg.p1.z])
}

fn unpack_segment(v: &DVector<f64>) -> Result<Segment3d> {
    ensure!(v.len() == 6, "line endpoints require 6D vector, got {}", v.len());
    Ok(Segment3d::new(
        Pt3::new(v[0], v[1], v[2]),
        Pt3::new(v[3], v[4], v[5]),
    ))
}

fn observed_endpoints(track: &LineTrack, idx: usize) -> [[f64; 2]; 2] {
    let seg = &track.observations[idx].seg2d;
    [[seg.p0.x, seg.p0.y], [seg.p1.x, seg.p1.y]]
}

/// Mean absolute distance of the observed endpoints to the projected track lines.
pub fn compute_line_bundle_stats(reconstruction: &LineReconstruction) -> Result<LineBundleStats> {
    let mut per_track_errors = Vec::with_capacity(reconstruction.num_tracks());
    let mut total_sum = 0.0;
    let mut total_count = 0usize;

    for track in &reconstruction.tracks {
        let endpoints = pack_segment(&track.line);
        let mut sum = 0.0;
        for (idx, obs) in track.observations.iter().enumerate() {
            let camera = CameraData::from_view(reconstruction.imagecols.camview(obs.image_id)?);
            let r = line_reproj_residual(
                endpoints.as_view(),
                &camera,
                &observed_endpoints(track, idx),
                1.0,
            );
            sum += r[0].abs() + r[1].abs();
        }
        let count = 2 * track.observations.len();
        per_track_errors.push(if count > 0 { sum / count as f64 } else { 0.0 });
        total_sum += sum;
        total_count += count;
    }

    ensure!(total_count > 0, "no observations for stats");
    Ok(LineBundleStats {
        mean_line_error: total_sum / total_count as f64,
        per_track_errors,
    })
}

/// Build IR for line bundle adjustment.
pub fn build_line_bundle_ir(
    reconstruction: &LineReconstruction,
    opts: &LineBundleOptions,
) -> Result<(ProblemIR, HashMap<String, DVector<f64>>)> {
    reconstruction.validate()?;
    ensure!(reconstruction.num_tracks() > 0, "need at least one track");
    ensure!(
        opts.obs_weight > 0.0,
        "observation weight must be positive, got {}",
        opts.obs_weight
    );
    ensure!(
        opts.prior_weight >= 0.0,
        "prior weight must be non-negative, got {}",
        opts.prior_weight
    );

    let mut ir = ProblemIR::new();
    let mut initial_map = HashMap::new();

    for (k, track) in reconstruction.tracks.iter().enumerate() {
        let name = track_param_name(k);
        let fixed = opts.fix_tracks.contains(&k);
        let id = ir.add_param_block(name.clone(), 6, fixed);
        let init = pack_segment(&track.line);

        for (idx, obs) in track.observations.iter().enumerate() {
            let view = reconstruction.imagecols.camview(obs.image_id)?;
            ir.add_residual_block(ResidualBlock::new(
                vec![id],
                opts.loss,
                FactorKind::LineReprojection {
                    camera: CameraData::from_view(view),
                    observed: observed_endpoints(track, idx),
                    w: opts.obs_weight,
                },
            ));
        }

        if opts.prior_weight > 0.0 {
            let mut target = [0.0; 6];
            target.copy_from_slice(init.as_slice());
            ir.add_residual_block(ResidualBlock::new(
                vec![id],
                RobustLoss::None,
                FactorKind::EndpointPrior {
                    target,
                    sqrt_w: opts.prior_weight.sqrt(),
                },
            ));
        }

        initial_map.insert(name, init);
    }

    ir.validate()?;
    Ok((ir, initial_map))
}

/// Replace every track line by its solved value. Lines that came back
/// non-finite or degenerate keep their input value.
fn extract_solution(
    solution: BackendSolution,
    reconstruction: &LineReconstruction,
) -> Result<LineBundleEstimate> {
    let mut refined = reconstruction.clone();
    for (k, track) in refined.tracks.iter_mut().enumerate() {
        let name = track_param_name(k);
        let solved = solution
            .params
            .get(&name)
            .ok_or_else(|| anyhow!("missing {} in solution", name))?;
        let line = unpack_segment(solved)?;
        if line.is_degenerate() {
            warn!("{} collapsed during refinement, keeping its input line", name);
            continue;
        }
        track.line = line;
    }
    Ok(LineBundleEstimate {
        reconstruction: refined,
        report: solution.report,
    })
}

/// Refine all track lines jointly against their 2D observations.
///
/// Cameras are held fixed; observations are returned unchanged.
pub fn optimize_line_bundle(
    reconstruction: &LineReconstruction,
    opts: &LineBundleOptions,
    backend_opts: &BackendSolveOptions,
) -> Result<LineBundleEstimate> {
    let (ir, initial_map) = build_line_bundle_ir(reconstruction, opts)?;
    let solution = TinySolverBackend.solve(&ir, &initial_map, backend_opts)?;
    let estimate = extract_solution(solution, reconstruction)?;
    info!(
        "line bundle: {} tracks, {} observations, cost {:.4e} -> {:.4e}",
        reconstruction.num_tracks(),
        reconstruction.num_observations(),
        estimate.report.initial_cost,
        estimate.report.final_cost
    );
    Ok(estimate)
}
