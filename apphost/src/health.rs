//! HTTP liveness probes
//!
//! A probe result is advisory: only the supervisor's exit watcher decides
//! that a process is dead.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PlatformError;

/// Outcome of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Liveness endpoint answered 2xx
    Healthy,

    /// Liveness endpoint answered with an error status
    Unhealthy,

    /// The application serves no liveness endpoint
    Unknown,

    /// Connection refused or timed out
    Unreachable,
}

/// Probe result with context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Probes applications on their local port
#[derive(Clone)]
pub struct HealthProbe {
    client: Client,
    path: String,
}

impl HealthProbe {
    pub fn new(timeout: Duration, path: impl Into<String>) -> Result<Self, PlatformError> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Ok(Self { client, path })
    }

    /// GET the liveness endpoint of an application listening on `port`
    pub async fn probe(&self, port: u16) -> HealthReport {
        let url = format!("http://127.0.0.1:{}{}", port, self.path);
        let started = std::time::Instant::now();
        let result = self.client.get(&url).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let code = response.status();
                debug!(url = %url, status = %code, "Health probe answered");
                HealthReport {
                    status: classify(code),
                    status_code: Some(code.as_u16()),
                    latency_ms,
                    error: None,
                }
            }
            Err(e) => {
                debug!(url = %url, "Health probe failed: {}", e);
                HealthReport {
                    status: HealthStatus::Unreachable,
                    status_code: None,
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn classify(code: StatusCode) -> HealthStatus {
    if code.is_success() {
        HealthStatus::Healthy
    } else if code == StatusCode::NOT_FOUND {
        HealthStatus::Unknown
    } else {
        HealthStatus::Unhealthy
    }
}
