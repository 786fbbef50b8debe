//! Periodic liveness probes of running applications

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::health::HealthStatus;
use crate::platform::Platform;

/// Health worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Probe interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Run the health worker. Results are only logged; a failing probe never
/// stops or restarts a process.
pub async fn run<S, F>(
    options: &Options,
    platform: &Platform,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Health worker starting...");

    let mut last: HashMap<String, HealthStatus> = HashMap::new();
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Health worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        let reports = match platform.check_all_health().await {
            Ok(reports) => reports,
            Err(e) => {
                error!("Health check failed: {}", e);
                continue;
            }
        };

        let mut current = HashMap::with_capacity(reports.len());
        for (app_id, report) in reports {
            if last.get(&app_id) != Some(&report.status) {
                match report.status {
                    HealthStatus::Healthy | HealthStatus::Unknown => {
                        info!(app_id = %app_id, status = ?report.status, "Health changed")
                    }
                    HealthStatus::Unhealthy | HealthStatus::Unreachable => warn!(
                        app_id = %app_id,
                        status = ?report.status,
                        code = ?report.status_code,
                        error = ?report.error,
                        "Health changed"
                    ),
                }
            } else {
                debug!(app_id = %app_id, status = ?report.status, latency_ms = report.latency_ms, "Health probed");
            }
            current.insert(app_id, report.status);
        }
        last = current;
    }
}
