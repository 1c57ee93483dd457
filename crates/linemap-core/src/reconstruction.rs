use crate::{ImageCollection, LineTrack};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Tracks together with the image collection they are observed in.
///
/// This is the unit handed to a joint refinement and returned from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineReconstruction {
    pub tracks: Vec<LineTrack>,
    pub imagecols: ImageCollection,
}

impl LineReconstruction {
    pub fn new(tracks: Vec<LineTrack>, imagecols: ImageCollection) -> Self {
        Self { tracks, imagecols }
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_observations(&self) -> usize {
        self.tracks.iter().map(LineTrack::num_lines).sum()
    }

    pub fn into_tracks(self) -> Vec<LineTrack> {
        self.tracks
    }

    /// Check that every track has observations in known images and a finite,
    /// non-degenerate line.
    pub fn validate(&self) -> Result<()> {
        for (k, track) in self.tracks.iter().enumerate() {
            ensure!(
                !track.observations.is_empty(),
                "track {} has no observations",
                k
            );
            ensure!(
                !track.line.is_degenerate(),
                "track {} has a degenerate or non-finite line",
                k
            );
            for obs in &track.observations {
                ensure!(
                    self.imagecols.contains(obs.image_id),
                    "track {} observes unknown image {}",
                    k,
                    obs.image_id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pt3, Segment2d, Segment3d, TrackObservation};

    fn track(image_id: u32) -> LineTrack {
        LineTrack {
            line: Segment3d::new(Pt3::new(0.0, 0.0, 1.0), Pt3::new(1.0, 0.0, 1.0)),
            observations: vec![TrackObservation {
                image_id,
                line_id: 0,
                seg2d: Segment2d::from_coords(0.0, 0.0, 1.0, 0.0),
                seg3d: Segment3d::new(Pt3::new(0.0, 0.0, 1.0), Pt3::new(1.0, 0.0, 1.0)),
            }],
        }
    }

    #[test]
    fn rejects_unknown_images_and_empty_tracks() {
        let rec = LineReconstruction::new(vec![track(5)], ImageCollection::new());
        assert!(rec.validate().is_err());

        let mut empty = track(5);
        empty.observations.clear();
        let rec = LineReconstruction::new(vec![empty], ImageCollection::new());
        assert!(rec.validate().is_err());
    }

    #[test]
    fn rejects_nan_lines() {
        let mut bad = track(0);
        bad.line.p1.x = f64::NAN;
        let rec = LineReconstruction::new(vec![bad], ImageCollection::new());
        assert!(rec.validate().is_err());
    }
}
