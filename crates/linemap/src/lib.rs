//! High-level entry crate for `linemap` 3D line reconstruction.
//!
//! Given posed, undistorted images with detected 2D line segments and one
//! depth map per image, `linemap` lifts each segment into 3D, links the
//! lifted segments across neighboring views into tracks, prunes
//! observations that disagree in 2D and optionally refines the tracks
//! jointly.
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! # let input = unimplemented!();
//! use linemap::prelude::*;
//!
//! let mut session = PipelineSession::<FitnmergeProblem>::new();
//! session.set_input(input)?;
//!
//! let mut config = FitnmergeConfig::default();
//! config.dir_save = "output".into();
//! run_fitnmerge(&mut session, Some(config))?;
//!
//! let result = session.export()?;
//! println!("{} tracks", result.tracks.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`session`] - Session framework (`PipelineSession`, `ProblemType`)
//! - [`fitnmerge`] - The fit-and-merge workflow and its step functions
//! - [`core`] - Geometry, cameras, depth maps, tracks and RANSAC
//! - [`fit`] - Depth-based segment lifting
//! - [`merge`] - Track merging, reprojection filtering and remerging
//! - [`optim`] - Line bundle refinement
//! - [`io`] - Output files and track reports

// ═══════════════════════════════════════════════════════════════════════════════
// Session Framework
// ═══════════════════════════════════════════════════════════════════════════════

/// Mutable state containers, step bookkeeping and JSON checkpointing.
pub mod session {
    pub use linemap_pipeline::session::{
        ExportRecord, InvalidationPolicy, LogEntry, PipelineSession, ProblemType, SessionMetadata,
    };
}

/// Fit-and-merge line reconstruction.
///
/// # Steps
/// 1. `step_fit` - Lift 2D segments into 3D, or load the fit cache
/// 2. `step_merge` - Link segments across neighboring views into tracks
/// 3. `step_filter` - Prune observations by 2D reprojection
/// 4. `step_remerge` - Consolidate tracks in 3D and filter again
/// 5. `step_refine` - Joint refinement (disabled by default)
/// 6. `step_save` - Write tracks and the session checkpoint
pub mod fitnmerge {
    pub use linemap_pipeline::fitnmerge::*;
    pub use linemap_pipeline::neighbors::{
        resolve_neighbors, truncate_neighbors, NeighborRanker, PoseNeighborRanker,
    };
}

/// Output files written by a run.
pub mod io {
    pub use linemap_pipeline::io::*;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Foundation Crates (Advanced Users)
// ═══════════════════════════════════════════════════════════════════════════════

/// Re-exports everything from `linemap_core`.
pub mod core {
    pub use linemap_core::*;
}

/// Re-exports everything from `linemap_fit`.
pub mod fit {
    pub use linemap_fit::*;
}

/// Re-exports everything from `linemap_merge`.
pub mod merge {
    pub use linemap_merge::*;
}

/// Re-exports everything from `linemap_optim`.
pub mod optim {
    pub use linemap_optim::*;
}

/// Synthetic scenes with exact depth for testing.
pub mod synthetic {
    pub use linemap_core::synthetic::*;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Re-exports (Top-Level)
// ═══════════════════════════════════════════════════════════════════════════════

pub use linemap_pipeline::{
    run_fitnmerge, run_fitnmerge_with, FitnmergeConfig, FitnmergeError, FitnmergeInput,
    FitnmergeOutput, FitnmergeProblem, PipelineSession, ProblemType,
};

pub use linemap_core::{
    CameraImage, CameraView, DepthMap, FxFyCxCySkew, ImageCollection, ImageId, LineTrack,
    NeighborMap, Pt2, Pt3, Segment2d, Segment3d, SegmentMap, TrackObservation,
};

pub use linemap_optim::{BackendSolveOptions, RobustLoss};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude (Quick Start)
// ═══════════════════════════════════════════════════════════════════════════════

/// Convenient re-exports for common use cases.
///
/// ```no_run
/// use linemap::prelude::*;
/// ```
pub mod prelude {
    pub use crate::session::{PipelineSession, ProblemType};
    pub use crate::{run_fitnmerge, FitnmergeConfig, FitnmergeInput, FitnmergeProblem};
    pub use crate::{
        CameraImage, CameraView, DepthMap, ImageCollection, LineTrack, Segment2d, Segment3d,
    };
    pub use crate::RobustLoss;
}
