//! Session container with mutable state.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::problem_type::{InvalidationPolicy, ProblemType};
use super::types::{ExportRecord, LogEntry, SessionMetadata};

/// A session container with mutable state.
///
/// Holds the configuration, the run input, per-stage state and the final
/// output. Step functions advance it in place and record their outcome in
/// `log`. Config changes follow [`ProblemType::on_config_change`], input
/// changes follow [`ProblemType::on_input_change`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "P: ProblemType")]
pub struct PipelineSession<P: ProblemType> {
    pub metadata: SessionMetadata,
    pub config: P::Config,
    input: Option<P::Input>,
    pub state: P::State,
    output: Option<P::Output>,
    pub exports: Vec<ExportRecord<P::Export>>,
    /// One entry per executed stage.
    pub log: Vec<LogEntry>,
}

impl<P: ProblemType> PipelineSession<P> {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_description(description: impl Into<String>) -> Self {
        Self::build(Some(description.into()))
    }

    fn build(description: Option<String>) -> Self {
        Self {
            metadata: SessionMetadata::new(P::name(), P::schema_version(), description),
            config: P::Config::default(),
            input: None,
            state: P::State::default(),
            output: None,
            exports: Vec::new(),
            log: Vec::new(),
        }
    }

    fn apply_policy(&mut self, policy: InvalidationPolicy) {
        if policy.clear_state {
            self.state = P::State::default();
        }
        if policy.clear_output {
            self.output = None;
        }
        if policy.clear_exports {
            self.exports.clear();
        }
    }

    /// Validate and store the input, then apply the input invalidation policy.
    pub fn set_input(&mut self, input: P::Input) -> Result<()> {
        P::validate_input(&input)?;
        self.apply_policy(P::on_input_change());
        self.input = Some(input);
        self.metadata.touch();
        Ok(())
    }

    pub fn input(&self) -> Option<&P::Input> {
        self.input.as_ref()
    }

    pub fn require_input(&self) -> Result<&P::Input> {
        self.input.as_ref().ok_or_else(|| anyhow!("input not set"))
    }

    /// Validate and store the config, then apply the config invalidation policy.
    pub fn set_config(&mut self, config: P::Config) -> Result<()> {
        P::validate_config(&config)?;
        self.apply_policy(P::on_config_change());
        self.config = config;
        self.metadata.touch();
        Ok(())
    }

    pub fn require_output(&self) -> Result<&P::Output> {
        self.output
            .as_ref()
            .ok_or_else(|| anyhow!("output not computed"))
    }

    pub fn set_output(&mut self, output: P::Output) {
        self.output = Some(output);
        self.metadata.touch();
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Export the current output and record it in `exports`.
    pub fn export(&mut self) -> Result<P::Export> {
        let export = P::export(self.require_output()?, &self.config)?;
        self.exports.push(ExportRecord::new(export.clone()));
        self.metadata.touch();
        Ok(export)
    }

    /// Input is set and both input and config pass validation.
    pub fn validate(&self) -> Result<()> {
        P::validate_input(self.require_input()?)?;
        P::validate_config(&self.config)
    }

    pub fn log_completed(&mut self, operation: impl Into<String>, notes: impl Into<String>) {
        self.log.push(LogEntry::completed(operation, notes));
        self.metadata.touch();
    }

    pub fn log_failed(&mut self, operation: impl Into<String>, error: impl Into<String>) {
        self.log.push(LogEntry::failed(operation, error));
        self.metadata.touch();
    }

    /// Copy of the session as written to disk, with the input reduced by
    /// [`ProblemType::checkpoint_input`].
    fn checkpoint(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            config: self.config.clone(),
            input: self
                .input
                .as_ref()
                .map(|input| P::checkpoint_input(input, &self.state)),
            state: self.state.clone(),
            output: self.output.clone(),
            exports: self.exports.clone(),
            log: self.log.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.checkpoint()).map_err(Into::into)
    }

    /// Fails on malformed JSON or a schema version newer than supported.
    pub fn from_json(json: &str) -> Result<Self> {
        let session: Self = serde_json::from_str(json)?;
        if session.metadata.schema_version > P::schema_version() {
            bail!(
                "session schema version {} is newer than supported version {}",
                session.metadata.schema_version,
                P::schema_version()
            );
        }
        Ok(session)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write session {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read session {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid session {}", path.display()))
    }
}

impl<P: ProblemType> Default for PipelineSession<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct CountConfig {
        min_count: usize,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct CountInput {
        segments: Vec<u32>,
        /// Bulky per-run data only needed before counting.
        raw: Vec<f32>,
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct CountState {
        counted: Option<usize>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct CountOutput {
        total: usize,
    }

    #[derive(Debug)]
    struct CountProblem;

    impl ProblemType for CountProblem {
        type Config = CountConfig;
        type Input = CountInput;
        type State = CountState;
        type Output = CountOutput;
        type Export = CountOutput;

        fn name() -> &'static str {
            "segment_count"
        }

        fn validate_input(input: &Self::Input) -> Result<()> {
            if input.segments.is_empty() {
                bail!("no segments");
            }
            Ok(())
        }

        fn validate_config(config: &Self::Config) -> Result<()> {
            if config.min_count == 0 {
                bail!("min_count must be positive");
            }
            Ok(())
        }

        fn checkpoint_input(input: &Self::Input, state: &Self::State) -> Self::Input {
            let mut kept = input.clone();
            if state.counted.is_some() {
                kept.raw.clear();
            }
            kept
        }

        fn export(output: &Self::Output, _config: &Self::Config) -> Result<Self::Export> {
            Ok(output.clone())
        }
    }

    fn input() -> CountInput {
        CountInput {
            segments: vec![1, 2],
            raw: vec![0.5; 16],
        }
    }

    #[test]
    fn new_session_is_empty() {
        let session = PipelineSession::<CountProblem>::new();
        assert_eq!(session.metadata.problem_type, "segment_count");
        assert!(session.input().is_none());
        assert!(!session.has_output());
        assert!(session.log.is_empty());
    }

    #[test]
    fn set_input_validates_and_clears_computed() {
        let mut session = PipelineSession::<CountProblem>::new();
        let err = session
            .set_input(CountInput {
                segments: vec![],
                raw: vec![],
            })
            .unwrap_err();
        assert!(err.to_string().contains("no segments"));

        session.set_input(input()).unwrap();
        session.state.counted = Some(2);
        session.set_output(CountOutput { total: 2 });

        session.set_input(input()).unwrap();
        assert!(session.state.counted.is_none());
        assert!(!session.has_output());
    }

    #[test]
    fn invalid_config_is_not_applied() {
        let mut session = PipelineSession::<CountProblem>::new();
        session.set_config(CountConfig { min_count: 3 }).unwrap();
        assert!(session.set_config(CountConfig { min_count: 0 }).is_err());
        assert_eq!(session.config.min_count, 3);
    }

    #[test]
    fn export_requires_output() {
        let mut session = PipelineSession::<CountProblem>::new();
        assert!(session.export().is_err());
        session.set_output(CountOutput { total: 4 });
        assert_eq!(session.export().unwrap().total, 4);
        assert_eq!(session.exports.len(), 1);
    }

    #[test]
    fn checkpoint_drops_consumed_input() {
        let mut session = PipelineSession::<CountProblem>::with_description("two segments");
        session.set_input(input()).unwrap();
        session.log_completed("count", "2 segments");

        let before = PipelineSession::<CountProblem>::from_json(&session.to_json().unwrap()).unwrap();
        assert_eq!(before.input().unwrap().raw.len(), 16);

        session.state.counted = Some(2);
        let after = PipelineSession::<CountProblem>::from_json(&session.to_json().unwrap()).unwrap();
        assert!(after.input().unwrap().raw.is_empty());
        assert_eq!(after.input().unwrap().segments, vec![1, 2]);
        assert_eq!(after.state.counted, Some(2));
        assert_eq!(after.log.len(), 1);
        // The live session keeps its input.
        assert_eq!(session.input().unwrap().raw.len(), 16);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let mut session = PipelineSession::<CountProblem>::new();
        session.metadata.schema_version = 99;
        let err = PipelineSession::<CountProblem>::from_json(&session.to_json().unwrap()).unwrap_err();
        assert!(err.to_string().contains("newer"));
    }
}
