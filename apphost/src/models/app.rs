//! Application records

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an application as persisted in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Stopped,
    Running,
    Building,
    Error,
    Crashed,
}

impl AppStatus {
    /// Whether this status claims a live process. Such statuses cannot be
    /// true right after the platform itself restarts.
    pub fn implies_process(&self) -> bool {
        matches!(self, AppStatus::Running | AppStatus::Building)
    }
}

impl std::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppStatus::Stopped => "stopped",
            AppStatus::Running => "running",
            AppStatus::Building => "building",
            AppStatus::Error => "error",
            AppStatus::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// A user-owned deployable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub owner_id: String,
    pub name: String,

    /// Primary hostname label, served as `<subdomain>.<base_domain>`
    pub subdomain: String,

    /// Additional custom hostnames
    #[serde(default)]
    pub domains: BTreeSet<String>,

    /// Assigned for the lifetime of the application
    pub port: u16,

    pub status: AppStatus,

    /// Process id of the supervised child, mirrored for display only
    #[serde(default)]
    pub pid: Option<u32>,

    #[serde(default)]
    pub active_deployment_id: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewApplication {
    pub name: String,
    pub subdomain: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Application {
    /// Every hostname that should route to this application
    pub fn hostnames(&self, base_domain: &str) -> Vec<String> {
        let mut hosts = vec![self.primary_hostname(base_domain)];
        hosts.extend(self.domains.iter().cloned());
        hosts
    }

    /// `<subdomain>.<base_domain>`
    pub fn primary_hostname(&self, base_domain: &str) -> String {
        format!("{}.{}", self.subdomain, base_domain)
    }

    /// Environment handed to the application process: user variables first,
    /// then the platform-assigned identity, which always wins.
    pub fn process_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.insert("PORT".to_string(), self.port.to_string());
        env.insert("APP_NAME".to_string(), self.name.clone());
        env.insert("APP_ID".to_string(), self.id.clone());
        env
    }
}
