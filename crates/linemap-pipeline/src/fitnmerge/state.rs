//! Intermediate state and per-stage status of a fit-and-merge session.

use anyhow::anyhow;
use linemap_core::{FitOutput, LineTrack, NeighborMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fit,
    Merge,
    Filter,
    Remerge,
    Refine,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Fit,
        Stage::Merge,
        Stage::Filter,
        Stage::Remerge,
        Stage::Refine,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fit => "fit",
            Stage::Merge => "merge",
            Stage::Filter => "filter",
            Stage::Remerge => "remerge",
            Stage::Refine => "refine",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| {
                anyhow!("unknown stage {s:?}, expected fit, merge, filter, remerge or refine")
            })
    }
}

/// How a stage's result came about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    /// Restored from a cache on disk.
    Loaded,
    Computed,
    /// Disabled by configuration.
    Skipped,
}

impl StageStatus {
    /// Loaded, computed or skipped.
    pub fn is_done(self) -> bool {
        self != StageStatus::NotStarted
    }
}

/// Status of every stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTable {
    pub fit: StageStatus,
    pub merge: StageStatus,
    pub filter: StageStatus,
    pub remerge: StageStatus,
    pub refine: StageStatus,
}

impl StageTable {
    pub fn get(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Fit => self.fit,
            Stage::Merge => self.merge,
            Stage::Filter => self.filter,
            Stage::Remerge => self.remerge,
            Stage::Refine => self.refine,
        }
    }

    pub fn set(&mut self, stage: Stage, status: StageStatus) {
        let slot = match stage {
            Stage::Fit => &mut self.fit,
            Stage::Merge => &mut self.merge,
            Stage::Filter => &mut self.filter,
            Stage::Remerge => &mut self.remerge,
            Stage::Refine => &mut self.refine,
        };
        *slot = status;
    }

    /// Mark `stage` and every later stage as not started.
    pub fn reset_from(&mut self, stage: Stage) {
        for s in Stage::ALL.into_iter().filter(|s| *s >= stage) {
            self.set(s, StageStatus::NotStarted);
        }
    }
}

/// Intermediate results of a fit-and-merge session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitnmergeState {
    pub stages: StageTable,
    /// Per-image fit results, aligned with the input segments.
    pub fits: Option<FitOutput>,
    /// Neighbor map used for merging, after truncation.
    pub neighbors: Option<NeighborMap>,
    /// Current tracks; replaced by every stage after merging.
    pub tracks: Option<Vec<LineTrack>>,

    pub num_fitted: Option<usize>,
    pub num_merged_tracks: Option<usize>,
    pub num_filtered_tracks: Option<usize>,
    pub num_remerged_tracks: Option<usize>,
}

impl FitnmergeState {
    pub fn has_fits(&self) -> bool {
        self.fits.is_some()
    }

    pub fn has_tracks(&self) -> bool {
        self.tracks.is_some()
    }

    /// Drop the results of `stage` and every later stage.
    pub fn invalidate_from(&mut self, stage: Stage) {
        self.stages.reset_from(stage);
        if stage <= Stage::Fit {
            self.fits = None;
            self.num_fitted = None;
        }
        if stage <= Stage::Merge {
            self.neighbors = None;
            self.tracks = None;
            self.num_merged_tracks = None;
        }
        if stage <= Stage::Filter {
            self.num_filtered_tracks = None;
        }
        if stage <= Stage::Remerge {
            self.num_remerged_tracks = None;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
