//! Per-view 3D fitting of 2D line segments from depth.
//!
//! Each 2D segment is sampled once per pixel of length, the samples are
//! lifted into the world with the image's depth map, and a 3D line is found
//! with seeded RANSAC whose residuals are scaled by each sample's expected
//! metric uncertainty `depth * sqrt(var2d) / f`. Endpoints are recovered by
//! intersecting the fitted line with the viewing rays of the 2D endpoints.
//!
//! [`fit_3d_segs`] fans the images out over a bounded rayon pool and collects
//! one [`linemap_core::SegmentFit`] per input segment, keyed by image id.

mod dispatch;
mod error;
mod estimator;
pub mod sampling;
mod seg3d;

pub use dispatch::*;
pub use error::*;
pub use estimator::DepthLineEstimator;
pub use seg3d::*;
