//! In-memory store with optional JSON snapshot persistence

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::store::{ScanOptions, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entries: BTreeMap<String, Entry>,
}

/// Ordered in-memory store
///
/// Every operation runs under one lock, which makes compare-and-swap atomic
/// with respect to all other operations. When opened with a snapshot file,
/// [`MemoryStore::flush`] persists the live entries atomically.
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
    snapshot: Option<File>,
    dirty: AtomicBool,
}

impl MemoryStore {
    /// Create an empty, purely in-memory store
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            snapshot: None,
            dirty: AtomicBool::new(false),
        }
    }

    /// Open a store backed by a snapshot file, loading it if present
    pub async fn open(snapshot: File) -> Result<Self, PlatformError> {
        let entries = if snapshot.exists().await {
            let loaded: Snapshot = snapshot.read_json().await.map_err(|e| {
                PlatformError::StoreError(format!(
                    "Unable to load snapshot {}: {}",
                    snapshot.path().display(),
                    e
                ))
            })?;
            info!(
                "Loaded {} store entries from {}",
                loaded.entries.len(),
                snapshot.path().display()
            );
            loaded.entries
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            snapshot: Some(snapshot),
            dirty: AtomicBool::new(false),
        })
    }

    /// Write live entries to the snapshot file if anything changed since the
    /// last flush. A no-op for stores without a snapshot.
    pub async fn flush(&self) -> Result<(), PlatformError> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let now = Utc::now();
        let data = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.retain(|_, entry| entry.is_live(now));
            Snapshot {
                entries: entries.clone(),
            }
        };

        if let Err(e) = snapshot.write_json(&data).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(PlatformError::StoreError(format!("Snapshot write failed: {}", e)));
        }

        debug!("Flushed {} store entries", data.entries.len());
        Ok(())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Utc::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn expiry(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .map(|ttl| Utc::now() + ttl)
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, PlatformError> {
        let now = Utc::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), PlatformError> {
        let entry = Entry {
            value,
            expires_at: expiry(ttl),
        };
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.insert(key.to_string(), entry);
        }
        self.mark_dirty();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, PlatformError> {
        let now = Utc::now();
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.remove(key)
        };
        if removed.is_some() {
            self.mark_dirty();
        }
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool, PlatformError> {
        let now = Utc::now();
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

            let current = entries
                .get(key)
                .filter(|e| e.is_live(now))
                .map(|e| &e.value);
            if current != expected {
                return Ok(false);
            }

            match new {
                Some(value) => {
                    entries.insert(
                        key.to_string(),
                        Entry {
                            value,
                            expires_at: None,
                        },
                    );
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        self.mark_dirty();
        Ok(true)
    }

    async fn scan(
        &self,
        prefix: &str,
        options: ScanOptions,
    ) -> Result<Vec<(String, Value)>, PlatformError> {
        let now = Utc::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());

        let matching = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()));

        let limit = options.limit.unwrap_or(usize::MAX);
        let result = if options.reverse {
            let mut all: Vec<_> = matching.collect();
            all.reverse();
            all.truncate(limit);
            all
        } else {
            matching.take(limit).collect()
        };

        Ok(result)
    }
}
