//! Per-application serialization of lifecycle operations

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// One async mutex per application id. Operations on the same application
/// queue up; different applications never wait on each other.
#[derive(Default)]
pub struct AppLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to an application
    pub async fn lock(&self, app_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(app_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock of a deleted application unless someone is still
    /// holding or waiting for it
    pub fn forget(&self, app_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(app_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(app_id);
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
