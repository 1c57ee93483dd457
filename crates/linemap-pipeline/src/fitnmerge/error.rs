use linemap_core::ImageId;
use std::path::PathBuf;
use thiserror::Error;

/// Run-level failures of the fit-and-merge pipeline.
///
/// Per-segment and per-image problems never surface here; they become
/// `SegmentFit::Failed` or dropped tracks.
#[derive(Debug, Error)]
pub enum FitnmergeError {
    #[error("image {image_id} is not undistorted")]
    NotUndistorted { image_id: ImageId },
    #[error("image {image_id} has input data but no camera")]
    MissingCamera { image_id: ImageId },
    #[error("fit cache {} is missing or unreadable: {reason}", path.display())]
    CacheMiss { path: PathBuf, reason: String },
    #[error("fit cache {} is stale: {reason}", path.display())]
    StaleCache { path: PathBuf, reason: String },
    #[error("line refinement failed: {0}")]
    OptimizerFailed(String),
    #[error("refinement returned an invalid reconstruction: {0}")]
    InvalidReconstruction(String),
}
