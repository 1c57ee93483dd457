//! Session framework.
//!
//! A session is a mutable state container parameterized over a problem type.
//! It stores configuration, input data, intermediate state and a single final
//! output. Step functions mutate the session in-place, and the whole session
//! round-trips through a JSON checkpoint.
//!
//! ```no_run
//! use linemap_pipeline::session::PipelineSession;
//! use linemap_pipeline::fitnmerge::{FitnmergeProblem, run_fitnmerge};
//! # fn main() -> anyhow::Result<()> {
//! # let input = unimplemented!();
//!
//! let mut session = PipelineSession::<FitnmergeProblem>::new();
//! session.set_input(input)?;
//! run_fitnmerge(&mut session, None)?;
//!
//! let export = session.export()?;
//! # Ok(())
//! # }
//! ```

pub mod pipeline_session;
pub mod problem_type;
pub mod types;

pub use pipeline_session::PipelineSession;
pub use problem_type::{InvalidationPolicy, ProblemType};
pub use types::{ExportRecord, LogEntry, SessionMetadata};
