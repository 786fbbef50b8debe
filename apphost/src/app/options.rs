//! Application configuration options

use std::time::Duration;

use crate::deploy::pipeline::PipelineOptions;
use crate::platform::PlatformOptions;
use crate::proxy::sync::ProxyOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::supervisor::SupervisorOptions;
use crate::workers::{health, proxy_retry, store_flush};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Data directory layout
    pub layout: StorageLayout,

    /// Platform service configuration
    pub platform: PlatformOptions,

    /// Enable the local admin server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Enable periodic health probes
    pub enable_health_worker: bool,

    /// Health worker options
    pub health_worker: health::Options,

    /// Proxy retry worker options
    pub proxy_retry_worker: proxy_retry::Options,

    /// Store flush worker options
    pub store_flush_worker: store_flush::Options,
}

impl AppOptions {
    /// Derive runtime options from the settings file
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        let proxy_dir = settings
            .proxy
            .config_dir
            .clone()
            .unwrap_or_else(|| layout.proxy_dir().path().to_path_buf());

        let platform = PlatformOptions {
            port_floor: settings.port_floor,
            log_retention: Duration::from_secs(settings.log_retention_secs),
            log_replay_count: settings.log_replay_count,
            health_timeout: Duration::from_secs(settings.health.timeout_secs),
            health_path: settings.health.path.clone(),
            supervisor: SupervisorOptions {
                entry_point: settings.entry_point.clone(),
                grace_period: Duration::from_secs(settings.stop_grace_secs),
                ..SupervisorOptions::default()
            },
            pipeline: PipelineOptions {
                entry_point: settings.entry_point.clone(),
                max_deployments: settings.max_deployments,
                max_release_bytes: settings.max_release_bytes,
            },
            proxy: ProxyOptions {
                config_dir: proxy_dir,
                base_domain: settings.base_domain.clone(),
                reload_command: settings.proxy.reload_command.clone(),
                reload_timeout: Duration::from_secs(30),
            },
        };

        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.stop_grace_secs + 20),
            },
            layout,
            platform,
            enable_server: settings.server.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            enable_health_worker: settings.health.enabled,
            health_worker: health::Options {
                interval: Duration::from_secs(settings.health.interval_secs),
            },
            proxy_retry_worker: proxy_retry::Options::default(),
            store_flush_worker: store_flush::Options {
                interval: Duration::from_secs(settings.store.snapshot_interval_secs),
            },
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), StorageLayout::default())
    }
}

/// Lifecycle options for the platform
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown, covering the stop of every
    /// supervised process
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7700,
        }
    }
}
