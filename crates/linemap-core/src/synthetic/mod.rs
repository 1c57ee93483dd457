//! Deterministic synthetic scenes for tests and benchmarks.
//!
//! A scene is a set of pinhole views looking at known 3D segments that lie on
//! planes. 2D segments are obtained by projection and depth maps by
//! intersecting every pixel ray with the scene planes, so fitted results can be
//! compared against exact ground truth.
//!
//! # Example
//!
//! ```no_run
//! use linemap_core::synthetic::scene::SyntheticScene;
//!
//! let scene = SyntheticScene::wall().unwrap();
//! assert_eq!(scene.imagecols.len(), 3);
//! assert_eq!(scene.segments[&0].len(), 2);
//! ```

pub mod noise;
pub mod scene;
