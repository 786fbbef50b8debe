//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Platform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit platform logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also write platform logs to `<data_dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,

    /// Domain under which every application gets `<subdomain>.<base_domain>`
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// Lowest port handed to applications
    #[serde(default = "default_port_floor")]
    pub port_floor: u16,

    /// Deployments kept per application before old ones are pruned
    #[serde(default = "default_max_deployments")]
    pub max_deployments: usize,

    /// Seconds between SIGTERM and SIGKILL when stopping an application
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// File name of the executable every release must contain
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Largest unpacked release accepted, in bytes
    #[serde(default = "default_max_release_bytes")]
    pub max_release_bytes: u64,

    /// Seconds application log entries are retained
    #[serde(default = "default_log_retention_secs")]
    pub log_retention_secs: u64,

    /// Entries replayed to a new log subscriber
    #[serde(default = "default_log_replay_count")]
    pub log_replay_count: usize,

    /// Reverse proxy configuration
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Admin server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Health probe configuration
    #[serde(default)]
    pub health: HealthSettings,

    /// Store persistence configuration
    #[serde(default)]
    pub store: StoreSettings,
}

fn default_true() -> bool {
    true
}

fn default_base_domain() -> String {
    "localhost".to_string()
}

fn default_port_floor() -> u16 {
    8001
}

fn default_max_deployments() -> usize {
    5
}

fn default_stop_grace_secs() -> u64 {
    10
}

fn default_entry_point() -> String {
    "start".to_string()
}

fn default_max_release_bytes() -> u64 {
    1 << 30
}

fn default_log_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_log_replay_count() -> usize {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            base_domain: default_base_domain(),
            port_floor: default_port_floor(),
            max_deployments: default_max_deployments(),
            stop_grace_secs: default_stop_grace_secs(),
            entry_point: default_entry_point(),
            max_release_bytes: default_max_release_bytes(),
            log_retention_secs: default_log_retention_secs(),
            log_replay_count: default_log_replay_count(),
            proxy: ProxySettings::default(),
            server: ServerSettings::default(),
            health: HealthSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

/// Reverse proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Directory the per-application site files are written to.
    /// Defaults to `<data_dir>/proxy`.
    #[serde(default)]
    pub config_dir: Option<PathBuf>,

    /// Command that makes the running proxy re-read its configuration,
    /// e.g. `["caddy", "reload", "--config", "/etc/caddy/Caddyfile"]`.
    /// Empty means no external proxy is managed.
    #[serde(default)]
    pub reload_command: Vec<String>,
}

/// Admin server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    7700
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Health probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_health_path")]
    pub path: String,
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_health_timeout_secs() -> u64 {
    5
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval_secs(),
            timeout_secs: default_health_timeout_secs(),
            path: default_health_path(),
        }
    }
}

/// Store persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Seconds between snapshot flushes
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

fn default_snapshot_interval_secs() -> u64 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}
