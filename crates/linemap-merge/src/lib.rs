//! Turning per-image 3D segments into cross-view line tracks.
//!
//! - [`merge_line_tracks`]: link fitted segments across neighboring images
//!   with a combined 2D/3D [`LineLinker`] and extract union-find components.
//! - [`filter_tracks_by_reprojection`]: prune observations whose 2D
//!   segment disagrees with the projected track line.
//! - [`remerge`]: consolidate tracks whose lines coincide in 3D.

mod filtering;
/// Union-find structures shared by merging and remerging.
pub mod graph;
mod linker;
mod merging;
mod remerge;

pub use filtering::*;
pub use linker::*;
pub use merging::*;
pub use remerge::*;
