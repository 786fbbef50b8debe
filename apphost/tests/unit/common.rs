//! Shared fixtures

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use apphost::deploy::pipeline::PipelineOptions;
use apphost::errors::PlatformError;
use apphost::models::app::{AppStatus, NewApplication};
use apphost::platform::{Platform, PlatformOptions};
use apphost::proxy::sync::ProxyOptions;
use apphost::storage::layout::StorageLayout;
use apphost::store::keys::APP_PREFIX;
use apphost::store::memory::MemoryStore;
use apphost::store::{ScanOptions, Store};
use apphost::supervisor::SupervisorOptions;
use tempfile::TempDir;

pub const OWNER: &str = "user-1";

/// Long-running release that prints one line
pub const SERVE_SCRIPT: &str = "#!/bin/sh\necho \"serving on $PORT\"\nexec sleep 30\n";

/// Release that exits on its own right away
pub const CRASH_SCRIPT: &str = "#!/bin/sh\necho boom >&2\nexit 3\n";

pub struct Harness {
    pub _dir: TempDir,
    pub layout: StorageLayout,
    pub platform: Platform,
}

pub fn options(layout: &StorageLayout) -> PlatformOptions {
    PlatformOptions {
        port_floor: 9100,
        log_retention: Duration::from_secs(3600),
        log_replay_count: 50,
        health_timeout: Duration::from_secs(1),
        health_path: "/".to_string(),
        supervisor: SupervisorOptions {
            entry_point: "start".to_string(),
            grace_period: Duration::from_secs(2),
            drain_timeout: Duration::from_millis(200),
        },
        pipeline: PipelineOptions {
            entry_point: "start".to_string(),
            max_deployments: 5,
            max_release_bytes: 16 << 20,
        },
        proxy: ProxyOptions {
            config_dir: layout.proxy_dir().path().to_path_buf(),
            base_domain: "apps.test".to_string(),
            reload_command: Vec::new(),
            reload_timeout: Duration::from_secs(5),
        },
    }
}

pub async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let layout = StorageLayout::new(dir.path());
    layout.setup().await.unwrap();

    let store = Arc::new(MemoryStore::new());
    let platform = Platform::new(store, layout.clone(), options(&layout)).unwrap();

    Harness {
        _dir: dir,
        layout,
        platform,
    }
}

pub fn new_app(subdomain: &str) -> NewApplication {
    NewApplication {
        name: format!("{} app", subdomain),
        subdomain: subdomain.to_string(),
        ..Default::default()
    }
}

/// Poll the application record until it reaches `status`
pub async fn wait_for_status(platform: &Platform, app_id: &str, status: AppStatus) -> bool {
    for _ in 0..100 {
        if platform.app(app_id).await.unwrap().status == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Memory store with switchable write failures on application records
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    activation_frozen: AtomicBool,
    app_deletes_fail: AtomicBool,
}

impl FaultyStore {
    /// Refuse any write moving an application to a different active deployment
    pub fn freeze_activation(&self) {
        self.activation_frozen.store(true, Ordering::SeqCst);
    }

    /// Refuse to delete application records
    pub fn fail_app_deletes(&self) {
        self.app_deletes_fail.store(true, Ordering::SeqCst);
    }

    fn refuses_swap(&self, key: &str, expected: Option<&Value>, new: Option<&Value>) -> bool {
        let active = |value: Option<&Value>| value.and_then(|v| v.get("active_deployment_id")).cloned();
        self.activation_frozen.load(Ordering::SeqCst)
            && key.starts_with(APP_PREFIX)
            && new.is_some()
            && active(expected) != active(new)
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, PlatformError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), PlatformError> {
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, PlatformError> {
        if key.starts_with(APP_PREFIX) && self.app_deletes_fail.load(Ordering::SeqCst) {
            return Err(PlatformError::StoreError(format!("delete of {} refused", key)));
        }
        self.inner.delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool, PlatformError> {
        if self.refuses_swap(key, expected, new.as_ref()) {
            return Err(PlatformError::StoreError(format!("write to {} refused", key)));
        }
        self.inner.compare_and_swap(key, expected, new).await
    }

    async fn scan(&self, prefix: &str, options: ScanOptions) -> Result<Vec<(String, Value)>, PlatformError> {
        self.inner.scan(prefix, options).await
    }
}

pub struct FaultyHarness {
    pub _dir: TempDir,
    pub layout: StorageLayout,
    pub store: Arc<FaultyStore>,
    pub platform: Platform,
}

pub async fn faulty_harness() -> FaultyHarness {
    let dir = TempDir::new().unwrap();
    let layout = StorageLayout::new(dir.path());
    layout.setup().await.unwrap();

    let store = Arc::new(FaultyStore::default());
    let platform = Platform::new(store.clone(), layout.clone(), options(&layout)).unwrap();

    FaultyHarness {
        _dir: dir,
        layout,
        store,
        platform,
    }
}
