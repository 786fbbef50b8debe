//! Application log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a captured line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Output stream a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// stderr lines are errors, stdout lines are informational
    pub fn severity(&self) -> Severity {
        match self {
            Stream::Stdout => Severity::Info,
            Stream::Stderr => Severity::Error,
        }
    }
}

/// One persisted line of application output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub app_id: String,
    pub timestamp: DateTime<Utc>,

    /// Monotonic per platform run; breaks timestamp ties
    pub seq: u64,

    pub level: Severity,
    pub message: String,
}
