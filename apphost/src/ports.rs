//! Port allocation
//!
//! A port is owned by an application exactly while the `port/<n>` key holds
//! that application's id. Claiming is a single create-only write per
//! candidate, so concurrent allocations can never return the same port.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::PlatformError;
use crate::store::{keys, ScanOptions, Store};

/// Hands out unused TCP ports to applications
#[derive(Clone)]
pub struct PortAllocator {
    store: Arc<dyn Store>,
    floor: u16,
}

impl PortAllocator {
    pub fn new(store: Arc<dyn Store>, floor: u16) -> Self {
        Self { store, floor }
    }

    /// Lowest port this allocator hands out
    pub fn floor(&self) -> u16 {
        self.floor
    }

    /// Claim the first free port at or above the configured floor
    pub async fn allocate(&self, app_id: &str) -> Result<u16, PlatformError> {
        self.allocate_from(self.floor, app_id).await
    }

    /// Claim the first free port at or above `start`
    pub async fn allocate_from(&self, start: u16, app_id: &str) -> Result<u16, PlatformError> {
        let owner = Value::String(app_id.to_string());

        for port in start..=u16::MAX {
            if self
                .store
                .compare_and_swap(&keys::port(port), None, Some(owner.clone()))
                .await?
            {
                info!(port = port, app_id = %app_id, "Allocated port");
                return Ok(port);
            }
            debug!(port = port, "Port taken, trying next");
        }

        Err(PlatformError::PortsExhausted(start))
    }

    /// Release a port. Releasing a free port is a no-op.
    pub async fn release(&self, port: u16) -> Result<(), PlatformError> {
        if self.store.delete(&keys::port(port)).await? {
            info!(port = port, "Released port");
        }
        Ok(())
    }

    /// The application currently holding `port`
    pub async fn owner(&self, port: u16) -> Result<Option<String>, PlatformError> {
        Ok(self
            .store
            .get(&keys::port(port))
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Every assigned port with its owner, ascending
    pub async fn assignments(&self) -> Result<Vec<(u16, String)>, PlatformError> {
        let entries = self
            .store
            .scan(keys::PORT_PREFIX, ScanOptions::default())
            .await?;

        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| {
                let port = key.strip_prefix(keys::PORT_PREFIX)?.parse().ok()?;
                let owner = value.as_str()?.to_string();
                Some((port, owner))
            })
            .collect())
    }
}
