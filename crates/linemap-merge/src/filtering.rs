//! Pruning track observations by 2D reprojection consistency.

use linemap_core::{CameraView, ImageCollection, LineTrack, Real, Segment3d, TrackObservation};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprojectionFilterConfig {
    /// Maximum angle between projected line and observed segment, degrees.
    pub th_angular_2d: Real,
    /// Maximum endpoint distance to the projected line, pixels.
    pub th_perp_2d: Real,
    /// Number of violating observations tolerated per track.
    pub num_outliers: usize,
}

impl Default for ReprojectionFilterConfig {
    fn default() -> Self {
        Self {
            th_angular_2d: 8.0,
            th_perp_2d: 5.0,
            num_outliers: 0,
        }
    }
}

impl ReprojectionFilterConfig {
    pub fn apply(&self, tracks: Vec<LineTrack>, imagecols: &ImageCollection) -> Vec<LineTrack> {
        filter_tracks_by_reprojection(
            tracks,
            imagecols,
            self.th_angular_2d,
            self.th_perp_2d,
            self.num_outliers,
        )
    }
}

/// 2D error of a track line against one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReprojectionError {
    /// Undirected angle, degrees.
    pub angle: Real,
    /// Largest observed-endpoint distance to the projected infinite line, pixels.
    pub perp: Real,
}

/// `None` when the line does not project (an endpoint behind the camera).
pub fn reprojection_error(
    line: &Segment3d,
    obs: &TrackObservation,
    view: &CameraView,
) -> Option<ReprojectionError> {
    let projected = view.project_segment(line)?;
    if projected.length() <= 0.0 {
        return None;
    }
    Some(ReprojectionError {
        angle: projected.angle_to(&obs.seg2d),
        perp: projected.max_endpoint_distance(&obs.seg2d),
    })
}

/// Normalized severity of every violating observation of `track`.
fn violations(
    track: &LineTrack,
    imagecols: &ImageCollection,
    cfg: &ReprojectionFilterConfig,
) -> Vec<(usize, Real)> {
    track
        .observations
        .iter()
        .enumerate()
        .filter_map(|(k, obs)| {
            let err = imagecols
                .camview(obs.image_id)
                .ok()
                .and_then(|view| reprojection_error(&track.line, obs, view));
            let severity = match err {
                Some(e) => (e.angle / cfg.th_angular_2d).max(e.perp / cfg.th_perp_2d),
                None => Real::INFINITY,
            };
            let violates = match err {
                Some(e) => e.angle > cfg.th_angular_2d || e.perp > cfg.th_perp_2d,
                None => true,
            };
            violates.then_some((k, severity))
        })
        .collect()
}

/// Remove inconsistent observations until each track has at most
/// `num_outliers` violations, re-deriving the line after every removal.
/// Tracks left without observations are dropped.
pub fn filter_tracks_by_reprojection(
    tracks: Vec<LineTrack>,
    imagecols: &ImageCollection,
    th_angular_2d: Real,
    th_perp_2d: Real,
    num_outliers: usize,
) -> Vec<LineTrack> {
    let cfg = ReprojectionFilterConfig {
        th_angular_2d,
        th_perp_2d,
        num_outliers,
    };
    let num_in = tracks.len();
    let obs_in: usize = tracks.iter().map(LineTrack::num_lines).sum();

    let out: Vec<LineTrack> = tracks
        .into_iter()
        .filter_map(|track| filter_track(track, imagecols, &cfg))
        .collect();

    let obs_out: usize = out.iter().map(LineTrack::num_lines).sum();
    info!(
        "reprojection filter: {} -> {} tracks, {} -> {} observations",
        num_in,
        out.len(),
        obs_in,
        obs_out
    );
    out
}

fn filter_track(
    mut track: LineTrack,
    imagecols: &ImageCollection,
    cfg: &ReprojectionFilterConfig,
) -> Option<LineTrack> {
    loop {
        let bad = violations(&track, imagecols, cfg);
        if bad.len() <= cfg.num_outliers {
            return Some(track);
        }
        // Worst first; ties resolve to the earliest observation.
        let (worst, _) = bad
            .into_iter()
            .fold(None::<(usize, Real)>, |acc, (k, s)| match acc {
                Some((_, best)) if best >= s => acc,
                _ => Some((k, s)),
            })?;
        track.observations.remove(worst);
        if track.observations.is_empty() || !track.recompute_line() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linemap_core::synthetic::scene::SyntheticScene;
    use linemap_core::Vec2;

    fn wall_track(scene: &SyntheticScene, line: usize) -> LineTrack {
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
        LineTrack::from_observations(observations).unwrap()
    }

    #[test]
    fn consistent_track_is_untouched() {
        let scene = SyntheticScene::wall().unwrap();
        let track = wall_track(&scene, 0);
        let out = filter_tracks_by_reprojection(vec![track.clone()], &scene.imagecols, 8.0, 5.0, 0);
        assert_eq!(out, vec![track]);
    }

    #[test]
    fn outlier_observation_is_removed() {
        let scene = SyntheticScene::wall().unwrap();
        let mut track = wall_track(&scene, 0);
        track.observations[1].seg2d.p1 += Vec2::new(0.0, 30.0);

        let out = filter_tracks_by_reprojection(vec![track.clone()], &scene.imagecols, 8.0, 5.0, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].image_ids(), vec![0, 2]);

        let tolerant = filter_tracks_by_reprojection(vec![track], &scene.imagecols, 8.0, 5.0, 1);
        assert_eq!(tolerant[0].num_lines(), 3);
    }

    #[test]
    fn tolerated_outliers_keep_only_the_mildest() {
        let scene = SyntheticScene::wall().unwrap();
        let mut track = wall_track(&scene, 0);
        let base = track.observations[0];
        let dir = (base.seg2d.p1 - base.seg2d.p0).normalize();
        let normal = Vec2::new(-dir.y, dir.x);
        for offset in [20.0, 10.0, 30.0] {
            let mut obs = base;
            obs.seg2d.p1 += normal * offset;
            track.observations.push(obs);
        }
        let (th_angle, th_perp, num_outliers) = (8.0, 5.0, 1);

        let out = filter_tracks_by_reprojection(
            vec![track.clone()],
            &scene.imagecols,
            th_angle,
            th_perp,
            num_outliers,
        );
        assert_eq!(out.len(), 1);
        let kept = &out[0];
        assert_eq!(kept.num_lines(), 4);
        assert_eq!(&kept.observations[..3], &track.observations[..3]);

        let errors: Vec<ReprojectionError> = kept
            .observations
            .iter()
            .map(|obs| {
                let view = scene.imagecols.camview(obs.image_id).unwrap();
                reprojection_error(&kept.line, obs, view).unwrap()
            })
            .collect();
        let violating = errors
            .iter()
            .filter(|e| e.angle > th_angle || e.perp > th_perp)
            .count();
        assert_eq!(violating, num_outliers);
        assert!((errors[3].perp - 10.0).abs() < 1e-6);

        let lenient = filter_tracks_by_reprojection(vec![track], &scene.imagecols, th_angle, th_perp, 3);
        assert_eq!(lenient[0].num_lines(), 6);
    }

    #[test]
    fn filter_is_a_fixed_point() {
        let scene = SyntheticScene::wall().unwrap();
        let mut track = wall_track(&scene, 1);
        track.observations[0].seg2d.p0 += Vec2::new(12.0, 0.0);
        let once = filter_tracks_by_reprojection(vec![track], &scene.imagecols, 8.0, 5.0, 0);
        let twice = filter_tracks_by_reprojection(once.clone(), &scene.imagecols, 8.0, 5.0, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn track_in_unknown_image_is_dropped() {
        let scene = SyntheticScene::wall().unwrap();
        let mut track = wall_track(&scene, 0);
        track.observations.truncate(1);
        track.observations[0].image_id = 99;
        let out = filter_tracks_by_reprojection(vec![track], &scene.imagecols, 8.0, 5.0, 0);
        assert!(out.is_empty());
    }
}
