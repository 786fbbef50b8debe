//! Periodic store snapshots

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{error, info};

use crate::store::memory::MemoryStore;

/// Store flush worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Flush interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Run the store flush worker. The final flush on shutdown is done by the
/// shutdown manager after every process has stopped.
pub async fn run<S, F>(
    options: &Options,
    store: &MemoryStore,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Store flush worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Store flush worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        if let Err(e) = store.flush().await {
            error!("Store flush failed: {}", e);
        }
    }
}
