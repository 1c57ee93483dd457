//! Step functions for fit-and-merge line reconstruction.

use anyhow::{anyhow, Context, Result};
use linemap_core::{FitOutput, LineReconstruction, LineTrack};
use linemap_fit::{fit_3d_segs, DepthSegmentFitter, FitStats, SegmentFitter};
use linemap_merge::{merge_line_tracks, remerge};
use log::{debug, info, warn};
use std::path::Path;

use crate::io::{self, TrackReport, SESSION_FILE};
use crate::neighbors::{resolve_neighbors, NeighborRanker, PoseNeighborRanker};
use crate::session::PipelineSession;

use super::cache::{fit_cache_path, FitCache};
use super::error::FitnmergeError;
use super::problem::{
    FitnmergeConfig, FitnmergeInput, FitnmergeOutput, FitnmergeProblem, FitnmergeStats,
};
use super::refine::{LineBundleRefiner, LineRefiner};
use super::state::{Stage, StageStatus};

type Session = PipelineSession<FitnmergeProblem>;

/// Where the fit stage takes its output from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitDecision {
    /// Read the cache; a missing or unusable cache is fatal.
    LoadOnly,
    /// Read the cache, refit if it is unusable.
    LoadOrCompute,
    /// Fit and write the cache.
    Compute,
}

impl FitDecision {
    pub fn decide(load_fit: bool, skip_exists: bool, cache_exists: bool) -> Self {
        if load_fit {
            FitDecision::LoadOnly
        } else if skip_exists && cache_exists {
            FitDecision::LoadOrCompute
        } else {
            FitDecision::Compute
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

fn load_checked_cache(path: &Path, detector: &str, input: &FitnmergeInput) -> Result<FitOutput> {
    let cache = FitCache::load(path)?;
    cache.check_against(detector, input)?;
    Ok(cache.fits)
}

fn compute_fits<F: SegmentFitter + ?Sized>(
    fitter: &F,
    input: &FitnmergeInput,
    config: &FitnmergeConfig,
) -> Result<FitOutput> {
    if input.depths.is_empty() && input.num_segments() > 0 {
        warn!("input carries no depth maps, every segment fit will fail");
    }
    let fits = fit_3d_segs(
        fitter,
        &input.segments,
        &input.imagecols,
        &input.depths,
        config.fitting.n_jobs,
    )
    .context("parallel fitting failed")?;
    let path = fit_cache_path(&config.dir_save, &config.detector);
    let cache = FitCache::new(&config.detector, fits);
    cache
        .save(&path)
        .with_context(|| format!("failed to save fit cache {}", path.display()))?;
    debug!("saved fit cache {}", path.display());
    Ok(cache.fits)
}

fn take_tracks(session: &mut Session, stage: Stage) -> Result<Vec<LineTrack>> {
    session
        .state
        .tracks
        .take()
        .ok_or_else(|| anyhow!("merging required before {}", stage))
}

// ─────────────────────────────────────────────────────────────────────────────
// Step Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Lift every 2D segment into 3D, or restore the fits from the cache.
///
/// Also writes the image list and collection into `dir_save`. Resets every
/// later stage.
pub fn step_fit<F: SegmentFitter + ?Sized>(session: &mut Session, fitter: &F) -> Result<()> {
    session.validate()?;
    let input = session.require_input()?;
    let config = &session.config;
    info!(
        "fit-and-merge: {} images, {} 2D segments",
        input.imagecols.len(),
        input.num_segments()
    );
    io::save_image_metadata(&config.dir_save, &input.imagecols)
        .context("failed to write image metadata")?;

    let load_path = fit_cache_path(config.dir_load(), &config.detector);
    let decision = FitDecision::decide(config.load_fit, config.skip_exists, load_path.exists());
    debug!("fit stage: {:?} with cache {}", decision, load_path.display());

    let (fits, status) = match decision {
        FitDecision::LoadOnly => {
            let cache = FitCache::load(&load_path).map_err(|e| FitnmergeError::CacheMiss {
                path: load_path.clone(),
                reason: format!("{e:#}"),
            })?;
            cache
                .check_against(&config.detector, input)
                .map_err(|e| FitnmergeError::StaleCache {
                    path: load_path.clone(),
                    reason: format!("{e:#}"),
                })?;
            (cache.fits, StageStatus::Loaded)
        }
        FitDecision::LoadOrCompute => {
            match load_checked_cache(&load_path, &config.detector, input) {
                Ok(fits) => (fits, StageStatus::Loaded),
                Err(err) => {
                    let stale = FitnmergeError::StaleCache {
                        path: load_path.clone(),
                        reason: format!("{err:#}"),
                    };
                    warn!("{stale}, refitting");
                    (compute_fits(fitter, input, config)?, StageStatus::Computed)
                }
            }
        }
        FitDecision::Compute => (compute_fits(fitter, input, config)?, StageStatus::Computed),
    };

    let stats = FitStats::from_output(&fits);
    session.state.invalidate_from(Stage::Fit);
    session.state.fits = Some(fits);
    session.state.num_fitted = Some(stats.num_fitted);
    session.state.stages.fit = status;

    session.log_completed(
        "fit",
        format!(
            "{:?}: {} / {} segments fitted",
            status, stats.num_fitted, stats.num_segments
        ),
    );
    Ok(())
}

/// Merge the fitted segments into tracks using the default pose ranker
/// when the input carries no neighbors.
pub fn step_merge(session: &mut Session) -> Result<()> {
    step_merge_with(session, &PoseNeighborRanker::default())
}

/// Merge the fitted segments into tracks. Resets every later stage.
pub fn step_merge_with(session: &mut Session, ranker: &dyn NeighborRanker) -> Result<()> {
    session.validate()?;
    let input = session.require_input()?;
    let fits = session
        .state
        .fits
        .as_ref()
        .ok_or_else(|| anyhow!("fitting required before merging"))?;
    let config = &session.config;

    let neighbors = resolve_neighbors(
        input.neighbors.as_ref(),
        ranker,
        &input.imagecols,
        config.n_neighbors,
    );
    let result = merge_line_tracks(
        &config.linker(),
        &input.segments,
        fits,
        &input.imagecols,
        &neighbors,
    );
    let num_tracks = result.tracks.len();

    session.state.invalidate_from(Stage::Merge);
    session.state.neighbors = Some(neighbors);
    session.state.tracks = Some(result.tracks);
    session.state.num_merged_tracks = Some(num_tracks);
    session.state.stages.merge = StageStatus::Computed;

    session.log_completed(
        "merge",
        format!(
            "{} tracks from {} nodes and {} links",
            num_tracks, result.num_nodes, result.num_edges
        ),
    );
    Ok(())
}

/// Prune observations that disagree with their track's line in 2D.
pub fn step_filter(session: &mut Session) -> Result<()> {
    session.validate()?;
    let tracks = take_tracks(session, Stage::Filter)?;
    let input = session.require_input()?;
    let num_in = tracks.len();
    let tracks = session.config.filtering2d.apply(tracks, &input.imagecols);
    let num_out = tracks.len();

    session.state.invalidate_from(Stage::Filter);
    session.state.tracks = Some(tracks);
    session.state.num_filtered_tracks = Some(num_out);
    session.state.stages.filter = StageStatus::Computed;

    session.log_completed("filter", format!("{num_in} -> {num_out} tracks"));
    Ok(())
}

/// Consolidate tracks whose lines coincide in 3D, then filter again.
/// Skipped when `remerging.disable` is set.
pub fn step_remerge(session: &mut Session) -> Result<()> {
    session.validate()?;
    if session.config.remerging.disable {
        session.state.invalidate_from(Stage::Remerge);
        session.state.stages.remerge = StageStatus::Skipped;
        session.log_completed("remerge", "disabled");
        return Ok(());
    }

    let tracks = take_tracks(session, Stage::Remerge)?;
    let input = session.require_input()?;
    let num_in = tracks.len();
    let merged = remerge(&session.config.remerge_linker(), tracks);
    let num_merged = merged.len();
    let tracks = session.config.filtering2d.apply(merged, &input.imagecols);
    let num_out = tracks.len();

    session.state.invalidate_from(Stage::Remerge);
    session.state.tracks = Some(tracks);
    session.state.num_remerged_tracks = Some(num_out);
    session.state.stages.remerge = StageStatus::Computed;

    session.log_completed(
        "remerge",
        format!("{num_in} -> {num_merged} tracks, {num_out} after filtering"),
    );
    Ok(())
}

/// Jointly refine the tracks with `refiner`. Skipped when
/// `refinement.disable` is set or there is nothing to refine.
///
/// A refiner error or a returned reconstruction that fails validation is
/// fatal; the unrefined tracks are never used as a fallback.
pub fn step_refine<R: LineRefiner + ?Sized>(session: &mut Session, refiner: &R) -> Result<()> {
    session.validate()?;
    if session.config.refinement.disable {
        session.state.stages.refine = StageStatus::Skipped;
        session.log_completed("refine", "disabled");
        return Ok(());
    }

    let tracks = session
        .state
        .tracks
        .clone()
        .ok_or_else(|| anyhow!("merging required before {}", Stage::Refine))?;
    if tracks.is_empty() {
        info!("no tracks to refine");
        session.state.stages.refine = StageStatus::Skipped;
        session.log_completed("refine", "no tracks");
        return Ok(());
    }
    let imagecols = session.require_input()?.imagecols.clone();
    let reconstruction = LineReconstruction::new(tracks, imagecols);
    let config = session.config.refinement.clone();

    let refined = match refiner.refine(&reconstruction, &config) {
        Ok(refined) => refined,
        Err(err) => {
            let err = FitnmergeError::OptimizerFailed(format!("{err:#}"));
            session.log_failed("refine", err.to_string());
            return Err(err.into());
        }
    };
    // Observations must still refer to the run's images.
    let checked = LineReconstruction::new(refined.into_tracks(), reconstruction.imagecols);
    if let Err(err) = checked.validate() {
        let err = FitnmergeError::InvalidReconstruction(format!("{err:#}"));
        session.log_failed("refine", err.to_string());
        return Err(err.into());
    }

    let num_tracks = checked.num_tracks();
    info!("refined {} tracks", num_tracks);
    session.state.tracks = Some(checked.into_tracks());
    session.state.stages.refine = StageStatus::Computed;
    session.log_completed("refine", format!("{num_tracks} tracks"));
    Ok(())
}

/// Write the track outputs and the session checkpoint into `dir_save` and
/// set the session output.
pub fn step_save(session: &mut Session) -> Result<()> {
    let tracks = session
        .state
        .tracks
        .clone()
        .ok_or_else(|| anyhow!("merging required before saving"))?;
    let input = session.require_input()?;
    let config = &session.config;

    io::save_track_outputs(&config.dir_save, &tracks, config.n_visible_views)
        .context("failed to write track outputs")?;
    let report = TrackReport::from_tracks(&tracks, config.n_visible_views);
    if config.visualize {
        report.log();
    } else {
        info!(
            "{} final tracks, {} supported by >= {} images",
            report.num_tracks, report.num_visible, config.n_visible_views
        );
    }

    let state = &session.state;
    let stats = FitnmergeStats {
        num_images: input.imagecols.len(),
        num_segments: input.num_segments(),
        num_fitted: state.num_fitted.unwrap_or(0),
        num_merged_tracks: state.num_merged_tracks.unwrap_or(0),
        num_filtered_tracks: state.num_filtered_tracks.unwrap_or(0),
        num_remerged_tracks: state.num_remerged_tracks,
        num_final_tracks: tracks.len(),
        num_visible_tracks: report.num_visible,
    };
    let session_path = config.dir_save.join(SESSION_FILE);

    session.set_output(FitnmergeOutput { tracks, stats });
    session.log_completed("save", format!("{} tracks", report.num_tracks));
    session
        .save(&session_path)
        .context("failed to write session checkpoint")
}

fn run_stage<F, R>(session: &mut Session, stage: Stage, fitter: &F, refiner: &R) -> Result<()>
where
    F: SegmentFitter + ?Sized,
    R: LineRefiner + ?Sized,
{
    match stage {
        Stage::Fit => step_fit(session, fitter),
        Stage::Merge => step_merge(session),
        Stage::Filter => step_filter(session),
        Stage::Remerge => step_remerge(session),
        Stage::Refine => step_refine(session, refiner),
    }
    .with_context(|| format!("{stage} stage failed"))
}

/// Run every stage with the given collaborators: fit, merge, filter,
/// remerge, refine, save.
pub fn run_fitnmerge_with<F, R>(session: &mut Session, fitter: &F, refiner: &R) -> Result<()>
where
    F: SegmentFitter + ?Sized,
    R: LineRefiner + ?Sized,
{
    for stage in Stage::ALL {
        run_stage(session, stage, fitter, refiner)?;
    }
    step_save(session).context("save stage failed")
}

/// Run the full pipeline with the depth fitter and line bundle refiner.
pub fn run_fitnmerge(session: &mut Session, config: Option<FitnmergeConfig>) -> Result<()> {
    if let Some(cfg) = config {
        session.set_config(cfg)?;
    }
    let fitter = DepthSegmentFitter::new(session.config.fit_options());
    run_fitnmerge_with(session, &fitter, &LineBundleRefiner)
}

/// Run only the stages whose status is not done yet, then save.
///
/// Meant for sessions restored from a checkpoint. To redo a stage and
/// everything after it, call `session.state.invalidate_from(stage)` first.
/// Merging restarts from the stored fits; the later stages continue from
/// the current tracks.
pub fn resume_fitnmerge_with<F, R>(session: &mut Session, fitter: &F, refiner: &R) -> Result<()>
where
    F: SegmentFitter + ?Sized,
    R: LineRefiner + ?Sized,
{
    for stage in Stage::ALL {
        let status = session.state.stages.get(stage);
        if status.is_done() {
            info!("{stage}: {status:?}, not rerun");
            continue;
        }
        run_stage(session, stage, fitter, refiner)?;
    }
    step_save(session).context("save stage failed")
}

/// [`resume_fitnmerge_with`] using the depth fitter and line bundle refiner.
pub fn resume_fitnmerge(session: &mut Session, config: Option<FitnmergeConfig>) -> Result<()> {
    if let Some(cfg) = config {
        session.set_config(cfg)?;
    }
    let fitter = DepthSegmentFitter::new(session.config.fit_options());
    resume_fitnmerge_with(session, &fitter, &LineBundleRefiner)
}
