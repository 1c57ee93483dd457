use crate::{ImageId, Segment2d, Segment3d};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One supporting detection of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackObservation {
    pub image_id: ImageId,
    /// Index of the 2D segment within its image.
    pub line_id: usize,
    pub seg2d: Segment2d,
    /// Per-image 3D lift of `seg2d`.
    pub seg3d: Segment3d,
}

/// A 3D line supported by observations in several images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTrack {
    pub line: Segment3d,
    pub observations: Vec<TrackObservation>,
}

impl LineTrack {
    /// Build a track whose line is the aggregate of the observations' 3D segments.
    pub fn from_observations(observations: Vec<TrackObservation>) -> Option<Self> {
        let line = Segment3d::aggregate(observations.iter().map(|o| &o.seg3d))?;
        Some(Self { line, observations })
    }

    /// Re-derive the representative line from the current observations.
    ///
    /// Returns `false` (leaving the line untouched) when no usable 3D segment remains.
    pub fn recompute_line(&mut self) -> bool {
        match Segment3d::aggregate(self.observations.iter().map(|o| &o.seg3d)) {
            Some(line) => {
                self.line = line;
                true
            }
            None => false,
        }
    }

    /// Number of distinct supporting images.
    pub fn num_images(&self) -> usize {
        self.image_ids().len()
    }

    pub fn num_lines(&self) -> usize {
        self.observations.len()
    }

    /// Distinct supporting image ids, ascending.
    pub fn image_ids(&self) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = self.observations.iter().map(|o| o.image_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Observed 2D segments grouped by image.
    pub fn segments_by_image(&self) -> BTreeMap<ImageId, Vec<Segment2d>> {
        let mut out: BTreeMap<ImageId, Vec<Segment2d>> = BTreeMap::new();
        for obs in &self.observations {
            out.entry(obs.image_id).or_default().push(obs.seg2d);
        }
        out
    }
}
