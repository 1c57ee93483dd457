//! Fit-and-merge line reconstruction pipeline.
//!
//! The session API drives the stages over a mutable state container:
//!
//! ```no_run
//! use linemap_pipeline::session::PipelineSession;
//! use linemap_pipeline::fitnmerge::{
//!     FitnmergeProblem, LineBundleRefiner, step_filter, step_fit, step_merge, step_refine,
//!     step_remerge, step_save,
//! };
//! use linemap_fit::DepthSegmentFitter;
//! # fn main() -> anyhow::Result<()> {
//! # let input = unimplemented!();
//!
//! let mut session = PipelineSession::<FitnmergeProblem>::new();
//! session.set_input(input)?;
//!
//! // Option 1: Step-by-step control
//! let fitter = DepthSegmentFitter::new(session.config.fit_options());
//! step_fit(&mut session, &fitter)?;
//! step_merge(&mut session)?;
//! step_filter(&mut session)?;
//! step_remerge(&mut session)?;
//! step_refine(&mut session, &LineBundleRefiner)?;
//! step_save(&mut session)?;
//!
//! // Option 2: Pipeline function
//! // linemap_pipeline::run_fitnmerge(&mut session, None)?;
//!
//! let export = session.export()?;
//! # Ok(())
//! # }
//! ```

// Core session framework
pub mod session;

pub mod fitnmerge;
pub mod io;
pub mod neighbors;

// ─────────────────────────────────────────────────────────────────────────────
// Session API Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::session::{
    ExportRecord, InvalidationPolicy, LogEntry, PipelineSession, ProblemType, SessionMetadata,
};

pub use crate::fitnmerge::{
    resume_fitnmerge, resume_fitnmerge_with, run_fitnmerge, run_fitnmerge_with, FitnmergeConfig,
    FitnmergeError, FitnmergeExport, FitnmergeInput, FitnmergeOutput, FitnmergeProblem,
    FitnmergeState, FitnmergeStats, LineBundleRefiner, LineRefiner, Stage, StageStatus,
};

pub use crate::neighbors::{NeighborRanker, PoseNeighborRanker};
pub use crate::io::TrackReport;
