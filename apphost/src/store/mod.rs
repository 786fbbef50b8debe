//! Persistent key/value store
//!
//! The platform consumes storage only through [`Store`], so the in-memory
//! implementation can be replaced by any engine offering the same atomic
//! compare-and-swap and ordered prefix scans.

pub mod apps;
pub mod deployments;
pub mod keys;
pub mod logs;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::errors::PlatformError;

/// Options for a prefix scan
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Iterate from the greatest key downwards
    pub reverse: bool,

    /// Maximum number of entries returned
    pub limit: Option<usize>,
}

impl ScanOptions {
    pub fn newest_first(limit: usize) -> Self {
        Self {
            reverse: true,
            limit: Some(limit),
        }
    }
}

/// Durable key/value storage with atomic primitives
#[async_trait]
pub trait Store: Send + Sync {
    /// Point lookup; expired entries are absent
    async fn get(&self, key: &str) -> Result<Option<Value>, PlatformError>;

    /// Unconditional write, optionally expiring after `ttl`
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), PlatformError>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, PlatformError>;

    /// Atomically replace the value at `key` if it currently equals
    /// `expected` (`None` meaning absent). `new == None` deletes the key.
    /// Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool, PlatformError>;

    /// Ordered scan of every live key starting with `prefix`
    async fn scan(
        &self,
        prefix: &str,
        options: ScanOptions,
    ) -> Result<Vec<(String, Value)>, PlatformError>;
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value, PlatformError> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, PlatformError> {
    Ok(serde_json::from_value(value)?)
}

/// Read-modify-write a JSON record with compare-and-swap, retrying when a
/// concurrent writer got there first. Returns `None` if the key is absent.
pub(crate) async fn update_json<T, F>(
    store: &dyn Store,
    key: &str,
    mut mutate: F,
) -> Result<Option<T>, PlatformError>
where
    T: DeserializeOwned + Serialize,
    F: FnMut(&mut T),
{
    loop {
        let Some(current) = store.get(key).await? else {
            return Ok(None);
        };

        let mut record: T = decode(current.clone())?;
        mutate(&mut record);
        let updated = encode(&record)?;

        if store
            .compare_and_swap(key, Some(&current), Some(updated))
            .await?
        {
            return Ok(Some(record));
        }
    }
}
