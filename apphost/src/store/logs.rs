//! Application log persistence

use std::sync::Arc;
use std::time::Duration;

use crate::errors::PlatformError;
use crate::models::log::LogEntry;
use crate::store::{decode, encode, keys, ScanOptions, Store};

/// Append-only log storage with a retention window
#[derive(Clone)]
pub struct LogRepository {
    store: Arc<dyn Store>,
    retention: Duration,
}

impl LogRepository {
    pub fn new(store: Arc<dyn Store>, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub async fn append(&self, entry: &LogEntry) -> Result<(), PlatformError> {
        let key = keys::log(&entry.app_id, entry.timestamp.timestamp_millis(), entry.seq);
        self.store
            .put(&key, encode(entry)?, Some(self.retention))
            .await
    }

    /// Most recent entries of an application, newest first
    pub async fn recent(&self, app_id: &str, limit: usize) -> Result<Vec<LogEntry>, PlatformError> {
        self.store
            .scan(&keys::logs(app_id), ScanOptions::newest_first(limit))
            .await?
            .into_iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Drop every entry of an application
    pub async fn delete_all(&self, app_id: &str) -> Result<usize, PlatformError> {
        let entries = self
            .store
            .scan(&keys::logs(app_id), ScanOptions::default())
            .await?;
        let count = entries.len();
        for (key, _) in entries {
            self.store.delete(&key).await?;
        }
        Ok(count)
    }
}
