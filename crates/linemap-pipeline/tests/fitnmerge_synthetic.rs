use anyhow::{bail, Result};
use linemap_core::synthetic::scene::SyntheticScene;
use linemap_core::{CameraImage, DepthMap, ImageCollection, LineReconstruction, SegmentFit};
use linemap_fit::{DepthSegmentFitter, ImageFitInput, SegmentFitter};
use linemap_pipeline::fitnmerge::{
    fit_cache_path, resume_fitnmerge_with, run_fitnmerge, run_fitnmerge_with, step_fit, FitCache, FitnmergeConfig,
    FitnmergeError, FitnmergeInput, FitnmergeProblem, LineBundleRefiner, LineRefiner,
    RefinementConfig, Stage, StageStatus,
};
use linemap_pipeline::io::{self, ALLTRACKS_FILE, IMAGECOLS_FILE, IMAGE_LIST_FILE, SESSION_FILE};
use linemap_pipeline::session::PipelineSession;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wall_input() -> FitnmergeInput {
    let scene = SyntheticScene::wall().unwrap();
    FitnmergeInput::new(scene.imagecols, scene.segments, scene.depths)
}

fn config_in(dir: &Path) -> FitnmergeConfig {
    FitnmergeConfig {
        dir_save: dir.to_path_buf(),
        n_visible_views: 3,
        ..FitnmergeConfig::default()
    }
}

fn session_with(input: FitnmergeInput, config: FitnmergeConfig) -> PipelineSession<FitnmergeProblem> {
    let mut session = PipelineSession::<FitnmergeProblem>::new();
    session.set_input(input).unwrap();
    session.set_config(config).unwrap();
    session
}

/// Default fitter that counts how many images it was asked to fit.
#[derive(Default)]
struct CountingFitter {
    calls: AtomicUsize,
}

impl SegmentFitter for CountingFitter {
    fn fit_image(&self, input: &ImageFitInput<'_>) -> Vec<SegmentFit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DepthSegmentFitter::default().fit_image(input)
    }
}

#[derive(Default)]
struct CountingRefiner {
    calls: AtomicUsize,
}

impl LineRefiner for CountingRefiner {
    fn refine(
        &self,
        reconstruction: &LineReconstruction,
        _config: &RefinementConfig,
    ) -> Result<LineReconstruction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(reconstruction.clone())
    }
}

struct FailingRefiner;

impl LineRefiner for FailingRefiner {
    fn refine(&self, _: &LineReconstruction, _: &RefinementConfig) -> Result<LineReconstruction> {
        bail!("solver diverged")
    }
}

#[test]
fn wall_scene_end_to_end() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let scene = SyntheticScene::wall().unwrap();
    let mut session = session_with(wall_input(), config_in(dir.path()));

    run_fitnmerge(&mut session, None).unwrap();

    let output = session.require_output().unwrap();
    assert_eq!(output.tracks.len(), 2);
    for track in &output.tracks {
        assert_eq!(track.num_images(), 3);
        let line_id = track.observations[0].line_id;
        assert!(track.observations.iter().all(|o| o.line_id == line_id));
        assert!(track.line.angle_to(&scene.lines[line_id]) < 1.0);
    }
    assert_eq!(output.stats.num_images, 3);
    assert_eq!(output.stats.num_segments, 6);
    assert_eq!(output.stats.num_fitted, 6);
    assert_eq!(output.stats.num_final_tracks, 2);
    assert_eq!(output.stats.num_visible_tracks, 2);
    assert_eq!(session.state.stages.refine, StageStatus::Skipped);
    assert_eq!(session.state.stages.remerge, StageStatus::Computed);

    for name in [IMAGE_LIST_FILE, IMAGECOLS_FILE, ALLTRACKS_FILE, SESSION_FILE] {
        assert!(dir.path().join(name).is_file(), "missing {name}");
    }
    assert!(fit_cache_path(dir.path(), "lsd").is_file());
    let saved = io::load_tracks_folder(&dir.path().join(io::TRACKS_DIR)).unwrap();
    assert_eq!(saved, output.tracks);

    let restored =
        PipelineSession::<FitnmergeProblem>::load(&dir.path().join(SESSION_FILE)).unwrap();
    assert_eq!(restored.require_output().unwrap().tracks, output.tracks);
}

#[test]
fn refined_run_keeps_tracks() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.refinement.disable = false;
    let mut session = session_with(wall_input(), config);

    run_fitnmerge_with(&mut session, &DepthSegmentFitter::default(), &LineBundleRefiner).unwrap();

    assert_eq!(session.state.stages.refine, StageStatus::Computed);
    assert_eq!(session.require_output().unwrap().tracks.len(), 2);
}

#[test]
fn cached_fits_skip_the_fitter() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    let mut first = session_with(wall_input(), config_in(dir.path()));
    let fitter = CountingFitter::default();
    step_fit(&mut first, &fitter).unwrap();
    assert_eq!(fitter.calls.load(Ordering::SeqCst), 3);
    assert_eq!(first.state.stages.fit, StageStatus::Computed);

    let mut config = config_in(dir.path());
    config.skip_exists = true;
    let mut second = session_with(wall_input(), config);
    let fitter = CountingFitter::default();
    step_fit(&mut second, &fitter).unwrap();

    assert_eq!(fitter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.state.stages.fit, StageStatus::Loaded);
    assert_eq!(second.state.fits, first.state.fits);
}

#[test]
fn stale_cache_is_refit_with_skip_exists() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = wall_input();
    let stale = FitCache::new("lsd", Default::default());
    stale.save(&fit_cache_path(dir.path(), "lsd")).unwrap();

    let mut config = config_in(dir.path());
    config.skip_exists = true;
    let mut session = session_with(input, config);
    let fitter = CountingFitter::default();
    step_fit(&mut session, &fitter).unwrap();

    assert_eq!(fitter.calls.load(Ordering::SeqCst), 3);
    assert_eq!(session.state.stages.fit, StageStatus::Computed);
}

#[test]
fn load_fit_without_cache_is_fatal() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.load_fit = true;
    let mut session = session_with(wall_input(), config);
    let fitter = CountingFitter::default();

    let err = step_fit(&mut session, &fitter).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FitnmergeError>(),
        Some(FitnmergeError::CacheMiss { .. })
    ));
    assert_eq!(fitter.calls.load(Ordering::SeqCst), 0);
    assert!(!session.state.has_fits());
}

#[test]
fn distorted_images_are_rejected() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut input = wall_input();
    let images = input
        .imagecols
        .iter()
        .map(|(id, image)| {
            let mut image: CameraImage = image.clone();
            image.undistorted = id != 1;
            (id, image)
        })
        .collect::<Vec<_>>();
    input.imagecols = ImageCollection::from_images(images).unwrap();

    let mut session = PipelineSession::<FitnmergeProblem>::new();
    let err = session
        .set_input(input)
        .and_then(|()| run_fitnmerge(&mut session, Some(config_in(dir.path()))))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FitnmergeError>(),
        Some(FitnmergeError::NotUndistorted { image_id: 1 })
    ));
}

#[test]
fn disabled_refinement_never_calls_refiner() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(wall_input(), config_in(dir.path()));
    let refiner = CountingRefiner::default();

    run_fitnmerge_with(&mut session, &DepthSegmentFitter::default(), &refiner).unwrap();
    assert_eq!(refiner.calls.load(Ordering::SeqCst), 0);

    session.config.refinement.disable = false;
    run_fitnmerge_with(&mut session, &DepthSegmentFitter::default(), &refiner).unwrap();
    assert_eq!(refiner.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn refiner_failure_is_fatal() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.refinement.disable = false;
    let mut session = session_with(wall_input(), config);

    let err =
        run_fitnmerge_with(&mut session, &DepthSegmentFitter::default(), &FailingRefiner)
            .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FitnmergeError>(),
        Some(FitnmergeError::OptimizerFailed(_))
    ));
    assert!(!session.has_output());
    assert!(session.log.last().is_some_and(|entry| !entry.success));
}

#[test]
fn image_without_valid_depth_joins_no_track() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut input = wall_input();
    let view = &input.imagecols.image(2).unwrap().view;
    input
        .depths
        .insert(2, DepthMap::filled(view.width, view.height, 0.0));
    let mut session = session_with(input, config_in(dir.path()));

    run_fitnmerge(&mut session, None).unwrap();

    let output = session.require_output().unwrap();
    assert_eq!(output.stats.num_fitted, 4);
    assert_eq!(output.tracks.len(), 2);
    assert!(output.tracks.iter().all(|t| !t.image_ids().contains(&2)));
    assert_eq!(output.stats.num_visible_tracks, 0);
}

#[test]
fn two_images_of_one_line_give_one_track() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut input = wall_input();
    input.imagecols = ImageCollection::from_images(
        input
            .imagecols
            .iter()
            .filter(|(id, _)| *id < 2)
            .map(|(id, image)| (id, image.clone())),
    )
    .unwrap();
    input.segments.retain(|id, _| *id < 2);
    input.depths.retain(|id, _| *id < 2);
    for segs in input.segments.values_mut() {
        segs.truncate(1);
    }
    let mut config = config_in(dir.path());
    config.n_visible_views = 2;
    let mut session = session_with(input, config);

    run_fitnmerge(&mut session, None).unwrap();

    let output = session.require_output().unwrap();
    assert_eq!(output.tracks.len(), 1);
    assert_eq!(output.tracks[0].image_ids(), vec![0, 1]);
    assert_eq!(output.stats.num_visible_tracks, 1);
}

#[test]
fn refitting_invalidates_later_stages() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(wall_input(), config_in(dir.path()));
    run_fitnmerge(&mut session, None).unwrap();
    assert!(session.state.has_tracks());

    step_fit(&mut session, &DepthSegmentFitter::default()).unwrap();
    assert!(!session.state.has_tracks());
    assert_eq!(session.state.stages.get(Stage::Merge), StageStatus::NotStarted);
    assert_eq!(session.state.stages.get(Stage::Fit), StageStatus::Computed);
}

#[test]
fn checkpoint_remerges_from_stored_fits_without_depths() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(wall_input(), config_in(dir.path()));
    run_fitnmerge_with(&mut session, &CountingFitter::default(), &CountingRefiner::default())
        .unwrap();
    let tracks = session.require_output().unwrap().tracks.clone();

    let mut restored =
        PipelineSession::<FitnmergeProblem>::load(&dir.path().join(SESSION_FILE)).unwrap();
    let input = restored.require_input().unwrap();
    assert!(input.depths.is_empty());
    assert_eq!(input.num_segments(), 6);
    assert!(restored.state.has_fits());

    restored.state.invalidate_from(Stage::Merge);
    assert!(restored.state.has_fits());
    let mut config = restored.config.clone();
    config.filtering2d.th_perp_2d = 4.0;
    restored.set_config(config).unwrap();

    let fitter = CountingFitter::default();
    resume_fitnmerge_with(&mut restored, &fitter, &CountingRefiner::default()).unwrap();

    assert_eq!(fitter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(restored.state.stages.fit, StageStatus::Computed);
    assert_eq!(restored.state.stages.merge, StageStatus::Computed);
    assert_eq!(restored.state.stages.filter, StageStatus::Computed);
    assert_eq!(restored.require_output().unwrap().tracks, tracks);
    let last = restored.log.last().unwrap();
    assert_eq!(last.operation, "save");
}
