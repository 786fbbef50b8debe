//! Application state management

use std::sync::Arc;

use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::errors::PlatformError;
use crate::platform::Platform;
use crate::store::memory::MemoryStore;

/// Main application state
pub struct AppState {
    /// Snapshot-backed store shared by every component
    pub store: Arc<MemoryStore>,

    /// Platform services
    pub platform: Arc<Platform>,
}

impl AppState {
    /// Prepare the data directory, load the store and recover state left by
    /// a previous run
    pub async fn init(options: &AppOptions) -> Result<Self, PlatformError> {
        info!("Initializing application state...");

        options.layout.setup().await?;

        let store = Arc::new(MemoryStore::open(options.layout.store_file()).await?);
        let platform = Arc::new(Platform::new(
            store.clone(),
            options.layout.clone(),
            options.platform.clone(),
        )?);

        platform.recover().await?;
        store.flush().await?;

        Ok(Self { store, platform })
    }

    /// Stop every application process and persist the store
    pub async fn shutdown(&self) -> Result<(), PlatformError> {
        info!("Shutting down application state...");

        let stopped = self.platform.shutdown().await;
        info!("Stopped {} application process(es)", stopped);

        if let Err(e) = self.store.flush().await {
            error!("Final store flush failed: {}", e);
            return Err(e);
        }
        Ok(())
    }
}
