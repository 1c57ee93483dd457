//! Non-linear refinement of 3D line tracks.
//!
//! Problems are described once in a small intermediate representation
//! ([`ir::ProblemIR`]) and compiled by a backend. The only backend is
//! tiny-solver's Levenberg-Marquardt.
//!
//! ```ignore
//! use linemap_optim::{optimize_line_bundle, BackendSolveOptions, LineBundleOptions};
//!
//! let estimate = optimize_line_bundle(&reconstruction, &LineBundleOptions::default(),
//!     &BackendSolveOptions::default())?;
//! println!("cost {} -> {}", estimate.report.initial_cost, estimate.report.final_cost);
//! ```

pub mod backend;
pub mod factors;
pub mod ir;
pub mod problems;

pub use backend::{BackendSolution, BackendSolveOptions, OptimBackend, SolveReport, TinySolverBackend};
pub use ir::RobustLoss;
pub use problems::line_bundle::{
    build_line_bundle_ir, compute_line_bundle_stats, optimize_line_bundle, LineBundleEstimate,
    LineBundleOptions, LineBundleStats,
};
