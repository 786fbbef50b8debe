//! Retries route convergence after a failed proxy write or reload

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::platform::Platform;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Proxy retry worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// How often the dirty flag is checked
    pub check_interval: Duration,

    /// Backoff between consecutive failed attempts
    pub cooldown: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            cooldown: CooldownOptions::default(),
        }
    }
}

/// Run the proxy retry worker
pub async fn run<S, F>(
    options: &Options,
    platform: &Platform,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Proxy retry worker starting...");

    let mut failures: u32 = 0;
    loop {
        let wait = if failures == 0 {
            options.check_interval
        } else {
            calc_exp_backoff(&options.cooldown, failures - 1)
        };

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Proxy retry worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }

        if !platform.proxy().is_dirty() {
            failures = 0;
            continue;
        }

        debug!(attempt = failures + 1, "Converging proxy routes");
        match platform.converge_proxy().await {
            Ok(()) => {
                info!("Proxy routes converged");
                failures = 0;
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!(attempt = failures, "Proxy route convergence failed: {}", e);
            }
        }
    }
}
