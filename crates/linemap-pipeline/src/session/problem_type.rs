//! Problem type trait for sessions.
//!
//! Defines the minimal interface a problem must implement to work with
//! [`PipelineSession`](super::PipelineSession).

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// What to clear when a session's input or config changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationPolicy {
    /// Clear the intermediate stage results.
    pub clear_state: bool,
    pub clear_output: bool,
    pub clear_exports: bool,
}

impl InvalidationPolicy {
    pub const KEEP_ALL: Self = Self {
        clear_state: false,
        clear_output: false,
        clear_exports: false,
    };

    /// Clear state and output, keep exports.
    pub const CLEAR_COMPUTED: Self = Self {
        clear_state: true,
        clear_output: true,
        clear_exports: false,
    };
}

/// Interface of a pipeline problem.
///
/// The trait only carries types, identity, validation hooks and export.
/// Processing lives in step functions operating on
/// `&mut PipelineSession<Self>`, so each step can take its own options and
/// collaborators.
pub trait ProblemType: Sized + 'static {
    type Config: Clone + Default + Serialize + DeserializeOwned + Debug;
    type Input: Clone + Serialize + DeserializeOwned + Debug;
    type State: Clone + Default + Serialize + DeserializeOwned + Debug;
    type Output: Clone + Serialize + DeserializeOwned + Debug;
    type Export: Clone + Serialize + DeserializeOwned + Debug;

    /// Stable snake_case identifier, used in session files and logs.
    fn name() -> &'static str;

    /// Bump when a serialized associated type changes incompatibly. Sessions
    /// with a newer schema are rejected on load.
    fn schema_version() -> u32 {
        1
    }

    fn validate_input(_input: &Self::Input) -> Result<()> {
        Ok(())
    }

    fn validate_config(_config: &Self::Config) -> Result<()> {
        Ok(())
    }

    fn on_input_change() -> InvalidationPolicy {
        InvalidationPolicy::CLEAR_COMPUTED
    }

    fn on_config_change() -> InvalidationPolicy {
        InvalidationPolicy::KEEP_ALL
    }

    /// Input written to a checkpoint. Problems may leave out data that
    /// `state` has already consumed; the default keeps everything.
    fn checkpoint_input(input: &Self::Input, _state: &Self::State) -> Self::Input {
        input.clone()
    }

    fn export(output: &Self::Output, config: &Self::Config) -> Result<Self::Export>;
}
