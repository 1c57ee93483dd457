//! Core geometry and data model for `linemap`.
//!
//! This crate provides the building blocks shared by every other crate in the
//! workspace:
//!
//! - linear algebra type aliases (`Real`, `Vec3`, `Pt2`, and friends),
//! - undistorted pinhole camera views and image collections,
//! - dense depth maps,
//! - 2D/3D line segments, per-segment fit results, line tracks and the
//!   reconstruction aggregate handed to refinement,
//! - a deterministic, model-agnostic RANSAC engine.
//!
//! Camera convention: `x_cam = R * x_world + T`, pixels via `K * x_cam / z`.
//!
//! # Modules
//!
//! - \[`synthetic`\]: deterministic planar scenes with exact depth (tests/benchmarks).

/// Linear algebra type aliases and helpers.
mod math;
/// Pinhole intrinsics and camera views.
mod camera;
mod depth;
mod imagecols;
/// Segments, infinite lines and fit outcomes.
mod lines;
/// Generic RANSAC engine and traits.
mod ransac;
mod reconstruction;
/// Deterministic synthetic scene helpers.
pub mod synthetic;
mod track;

pub use camera::*;
pub use depth::*;
pub use imagecols::*;
pub use lines::*;
pub use math::*;
pub use ransac::*;
pub use reconstruction::*;
pub use track::*;

use std::collections::BTreeMap;

/// Per-image fit results, one entry per input 2D segment in input order.
pub type FitOutput = BTreeMap<ImageId, Vec<SegmentFit>>;

/// Per-image 2D detections.
pub type SegmentMap = BTreeMap<ImageId, Vec<Segment2d>>;
