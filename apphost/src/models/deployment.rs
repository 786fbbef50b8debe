//! Deployment models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Building,
    Active,
    Inactive,
    Failed,
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Active => "active",
            DeploymentStatus::Inactive => "inactive",
            DeploymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One versioned, immutable release of an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Owning application
    pub app_id: String,

    /// Per-application version, starting at 1
    pub version: u32,

    pub created_at: DateTime<Utc>,

    /// Who asked for this deployment
    pub initiated_by: String,

    pub status: DeploymentStatus,

    /// Release directory holding the materialized artifact
    pub artifact_path: PathBuf,

    /// Uploaded file name
    pub artifact_name: String,

    /// SHA-256 of the uploaded bytes
    pub artifact_sha256: String,

    /// One line per pipeline stage
    #[serde(default)]
    pub build_log: String,

    /// Optional error message
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl Deployment {
    /// Append a line to the build log
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.build_log.push_str(line.as_ref());
        self.build_log.push('\n');
    }
}
