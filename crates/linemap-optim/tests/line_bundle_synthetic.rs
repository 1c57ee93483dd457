use linemap_core::synthetic::scene::SyntheticScene;
use linemap_core::{LineReconstruction, LineTrack, TrackObservation, Vec3};
use linemap_optim::{
    compute_line_bundle_stats, optimize_line_bundle, BackendSolveOptions, LineBundleOptions,
    RobustLoss,
};

fn perturbed_reconstruction() -> (SyntheticScene, LineReconstruction) {
    let scene = SyntheticScene::wall().unwrap();
    let offsets = [Vec3::new(0.05, -0.03, 0.12), Vec3::new(-0.04, 0.02, -0.1)];
    let tracks = (0..scene.lines.len())
        .map(|line| {
            let observations = scene
                .imagecols
                .image_ids()
                .into_iter()
                .map(|id| TrackObservation {
                    image_id: id,
                    line_id: line,
                    seg2d: scene.segments[&id][line],
                    seg3d: scene.lines[line],
                })
                .collect();
            let mut track = LineTrack::from_observations(observations).unwrap();
            track.line.p0 += offsets[line];
            track
        })
        .collect();
    let rec = LineReconstruction::new(tracks, scene.imagecols.clone());
    (scene, rec)
}

#[test]
fn refinement_reduces_reprojection_error() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (scene, rec) = perturbed_reconstruction();
    let before = compute_line_bundle_stats(&rec).unwrap();

    let opts = LineBundleOptions {
        loss: RobustLoss::None,
        prior_weight: 1e-6,
        ..LineBundleOptions::default()
    };
    let estimate = optimize_line_bundle(&rec, &opts, &BackendSolveOptions::default()).unwrap();
    let after = compute_line_bundle_stats(&estimate.reconstruction).unwrap();

    assert!(estimate.report.final_cost < estimate.report.initial_cost);
    assert_eq!(estimate.report.num_blocks, rec.num_tracks());
    assert!(estimate.report.num_residuals >= rec.num_observations());
    assert!(after.mean_line_error < 0.1 * before.mean_line_error);
    assert!(after.mean_line_error < 0.05, "{after:?}");

    for (track, gt) in estimate.reconstruction.tracks.iter().zip(&scene.lines) {
        assert!(track.line.angle_to(gt) < 0.5, "{:?} vs {:?}", track.line, gt);
        assert_eq!(track.observations.len(), 3);
    }
}

#[test]
fn fixed_tracks_are_untouched() {
    let (_, rec) = perturbed_reconstruction();
    let opts = LineBundleOptions {
        fix_tracks: vec![0],
        ..LineBundleOptions::default()
    };
    let estimate = optimize_line_bundle(&rec, &opts, &BackendSolveOptions::default()).unwrap();
    assert_eq!(estimate.reconstruction.tracks[0].line, rec.tracks[0].line);
    assert_ne!(estimate.reconstruction.tracks[1].line, rec.tracks[1].line);
}
