//! Error types for the platform

use thiserror::Error;

/// Main error type for the platform
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("No free port at or above {0}")]
    PortsExhausted(u16),

    #[error("Artifact error: {0}")]
    ArtifactError(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Proxy error: {0}")]
    ProxyError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Whether the failure was caused by the request or artifact rather than
    /// by the platform itself.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PlatformError::ValidationError(_)
                | PlatformError::NotFound(_)
                | PlatformError::Forbidden(_)
                | PlatformError::Conflict(_)
                | PlatformError::PortsExhausted(_)
                | PlatformError::ArtifactError(_)
        )
    }
}

impl From<anyhow::Error> for PlatformError {
    fn from(err: anyhow::Error) -> Self {
        PlatformError::Internal(err.to_string())
    }
}
