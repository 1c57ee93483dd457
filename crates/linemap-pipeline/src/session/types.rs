//! Bookkeeping records stored alongside a session: metadata, stage log and
//! exports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Identity and timestamps of a session checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// `ProblemType::name()` of the session.
    pub problem_type: String,
    pub schema_version: u32,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub last_modified: u64,
    pub description: Option<String>,
}

impl SessionMetadata {
    pub fn new(problem_type: &str, schema_version: u32, description: Option<String>) -> Self {
        let now = unix_seconds();
        Self {
            problem_type: problem_type.to_owned(),
            schema_version,
            created_at: now,
            last_modified: now,
            description,
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = unix_seconds();
    }
}

/// Outcome of one pipeline stage, as recorded in the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    /// Stage name, e.g. `"fit"` or `"remerge"`.
    pub operation: String,
    pub success: bool,
    /// Counts on success, the error chain on failure.
    pub notes: String,
}

impl LogEntry {
    pub fn completed(operation: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            timestamp: unix_seconds(),
            operation: operation.into(),
            success: true,
            notes: notes.into(),
        }
    }

    pub fn failed(operation: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: unix_seconds(),
            operation: operation.into(),
            success: false,
            notes: error.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.success { "ok" } else { "failed" };
        write!(f, "{}: {} ({})", self.operation, outcome, self.notes)
    }
}

/// A result handed out by `PipelineSession::export`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord<E> {
    pub timestamp: u64,
    pub export: E,
}

impl<E> ExportRecord<E> {
    pub fn new(export: E) -> Self {
        Self {
            timestamp: unix_seconds(),
            export,
        }
    }
}

/// A clock set before the epoch reads as `0`.
fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
