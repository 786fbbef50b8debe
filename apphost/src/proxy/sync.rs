//! Reverse-proxy synchronizer
//!
//! One generated file per application in the configuration directory, which
//! the proxy's main configuration imports. A failed write or reload marks the
//! synchronizer dirty; the retry worker then converges the whole directory.
//!
//! Every write, removal and reload happens under one lock, and convergence
//! loads the application list only once it holds it. A file written for a
//! newly created application can therefore never be pruned as stale.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::PlatformError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::app::Application;
use crate::proxy::config;

/// Proxy options
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Directory receiving one configuration file per application
    pub config_dir: PathBuf,

    /// Domain under which primary subdomains are served
    pub base_domain: String,

    /// Program and arguments asking the proxy to reload gracefully.
    /// Empty when no external proxy is managed.
    pub reload_command: Vec<String>,

    pub reload_timeout: Duration,
}

/// Keeps the external reverse proxy's routes consistent with application state
pub struct ProxySync {
    options: ProxyOptions,
    dir: Dir,
    dirty: AtomicBool,
    routes_lock: Mutex<()>,
}

impl ProxySync {
    pub fn new(options: ProxyOptions) -> Self {
        let dir = Dir::new(&options.config_dir);
        Self {
            options,
            dir,
            dirty: AtomicBool::new(false),
            routes_lock: Mutex::new(()),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.options.base_domain
    }

    /// Configuration file of an application
    pub fn config_file(&self, app_id: &str) -> File {
        self.dir.file(&config::file_name(app_id))
    }

    /// Whether a write or reload failed and has not been retried successfully
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Regenerate an application's routes and reload the proxy
    pub async fn sync(&self, app: &Application) -> Result<(), PlatformError> {
        let _guard = self.routes_lock.lock().await;
        let contents = config::render(app, &self.options.base_domain);
        self.write(&app.id, contents.as_bytes()).await?;
        debug!(app_id = %app.id, hosts = ?app.hostnames(&self.options.base_domain), "Routes written");
        self.reload_locked().await
    }

    /// Remove an application's routes and reload the proxy
    pub async fn remove(&self, app_id: &str) -> Result<(), PlatformError> {
        let _guard = self.routes_lock.lock().await;
        if let Err(e) = self.config_file(app_id).delete().await {
            self.mark_dirty();
            return Err(PlatformError::ProxyError(format!(
                "Failed to remove routes of {}: {}",
                app_id, e
            )));
        }
        debug!(app_id = %app_id, "Routes removed");
        self.reload_locked().await
    }

    /// Rewrite the configuration of every application `load` returns, drop
    /// files of applications that no longer exist, then reload once
    pub async fn converge<F, Fut>(&self, load: F) -> Result<(), PlatformError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Application>, PlatformError>>,
    {
        let _guard = self.routes_lock.lock().await;
        let apps = load().await?;
        self.dir.create().await?;

        for app in &apps {
            let contents = config::render(app, &self.options.base_domain);
            self.write(&app.id, contents.as_bytes()).await?;
        }

        for name in self.dir.list_files().await? {
            let Some(app_id) = config::app_id_of(&name) else {
                continue;
            };
            if !apps.iter().any(|app| app.id == app_id) {
                info!(app_id = %app_id, "Removing stale routes");
                self.dir.file(&name).delete().await?;
            }
        }

        self.reload_locked().await
    }

    /// Ask the proxy to reload its configuration without dropping connections
    pub async fn reload(&self) -> Result<(), PlatformError> {
        let _guard = self.routes_lock.lock().await;
        self.reload_locked().await
    }

    async fn reload_locked(&self) -> Result<(), PlatformError> {
        match self.run_reload().await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                warn!("Proxy reload failed: {}", e);
                self.mark_dirty();
                Err(e)
            }
        }
    }

    async fn run_reload(&self) -> Result<(), PlatformError> {
        let Some((program, args)) = self.options.reload_command.split_first() else {
            return Ok(());
        };

        let output = tokio::time::timeout(
            self.options.reload_timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| PlatformError::ProxyError(format!("{} timed out", program)))?
        .map_err(|e| PlatformError::ProxyError(format!("Failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlatformError::ProxyError(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        info!("Proxy reloaded");
        Ok(())
    }

    async fn write(&self, app_id: &str, contents: &[u8]) -> Result<(), PlatformError> {
        self.config_file(app_id).write_atomic(contents).await.map_err(|e| {
            self.mark_dirty();
            PlatformError::ProxyError(format!("Failed to write routes of {}: {}", app_id, e))
        })
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}
