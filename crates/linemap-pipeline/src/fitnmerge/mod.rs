//! Fit-and-merge line reconstruction.
//!
//! Lifts per-image 2D segments into 3D using depth maps, merges them into
//! multi-view tracks, prunes inconsistent observations, consolidates tracks
//! again in 3D and optionally refines them jointly.

mod cache;
mod error;
mod problem;
mod refine;
mod state;
mod steps;

// Public API
pub use cache::{fit_cache_file_name, fit_cache_path, FitCache};
pub use error::FitnmergeError;
pub use problem::{
    FittingConfig, FitnmergeConfig, FitnmergeExport, FitnmergeInput, FitnmergeOutput,
    FitnmergeProblem, FitnmergeStats, MergingConfig, RefinementConfig, RemergingConfig,
    FALLBACK_VAR2D,
};
pub use refine::{LineBundleRefiner, LineRefiner};
pub use state::{FitnmergeState, Stage, StageStatus, StageTable};
pub use steps::{
    resume_fitnmerge, resume_fitnmerge_with, run_fitnmerge, run_fitnmerge_with, step_filter,
    step_fit, step_merge, step_merge_with, step_refine, step_remerge, step_save, FitDecision,
};
