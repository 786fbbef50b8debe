//! Platform façade
//!
//! The operations an API layer calls. Each one resolves the application,
//! checks that the caller owns it, and takes the application's lock before
//! touching the supervisor or the pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::deploy::pipeline::{DeploymentPipeline, PipelineOptions, Upload};
use crate::errors::PlatformError;
use crate::fanout::{ConnectionId, LogFanout, LogReceiver};
use crate::health::{HealthProbe, HealthReport};
use crate::models::app::{AppStatus, Application, NewApplication};
use crate::models::deployment::Deployment;
use crate::models::log::LogEntry;
use crate::platform::locks::AppLocks;
use crate::ports::PortAllocator;
use crate::proxy::sync::{ProxyOptions, ProxySync};
use crate::storage::layout::StorageLayout;
use crate::store::apps::AppRepository;
use crate::store::deployments::DeploymentRepository;
use crate::store::logs::LogRepository;
use crate::store::Store;
use crate::supervisor::{ProcessInfo, Supervisor, SupervisorOptions};
use crate::telemetry::{self, ProcessMetrics};
use crate::utils::{generate_uuid, normalize_hostname};

/// Platform options
#[derive(Debug, Clone)]
pub struct PlatformOptions {
    pub port_floor: u16,
    pub log_retention: Duration,
    pub log_replay_count: usize,
    pub health_timeout: Duration,
    pub health_path: String,
    pub supervisor: SupervisorOptions,
    pub pipeline: PipelineOptions,
    pub proxy: ProxyOptions,
}

/// What startup recovery changed
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Applications whose persisted status claimed a live process
    pub apps_reset: usize,

    /// Deployments left building by the previous run
    pub deployments_failed: usize,

    /// Release directories without a deployment record
    pub releases_removed: usize,
}

/// The application platform
pub struct Platform {
    apps: AppRepository,
    ports: PortAllocator,
    supervisor: Arc<Supervisor>,
    pipeline: DeploymentPipeline,
    proxy: Arc<ProxySync>,
    fanout: Arc<LogFanout>,
    health: HealthProbe,
    locks: AppLocks,
}

impl Platform {
    pub fn new(
        store: Arc<dyn Store>,
        layout: StorageLayout,
        options: PlatformOptions,
    ) -> Result<Self, PlatformError> {
        let apps = AppRepository::new(store.clone());
        let fanout = Arc::new(LogFanout::new(
            LogRepository::new(store.clone(), options.log_retention),
            options.log_replay_count,
        ));
        let supervisor = Arc::new(Supervisor::new(
            apps.clone(),
            fanout.clone(),
            options.supervisor,
        ));
        let pipeline = DeploymentPipeline::new(
            layout,
            apps.clone(),
            DeploymentRepository::new(store.clone()),
            supervisor.clone(),
            options.pipeline,
        );

        Ok(Self {
            apps,
            ports: PortAllocator::new(store, options.port_floor),
            supervisor,
            pipeline,
            proxy: Arc::new(ProxySync::new(options.proxy)),
            fanout,
            health: HealthProbe::new(options.health_timeout, options.health_path)?,
            locks: AppLocks::new(),
        })
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn proxy(&self) -> &Arc<ProxySync> {
        &self.proxy
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    // ---- applications ----

    /// Create an application: claim its primary hostname, allocate its port,
    /// persist it and publish its routes
    pub async fn create_app(&self, owner_id: &str, new: NewApplication) -> Result<Application, PlatformError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(PlatformError::ValidationError("Application name is empty".to_string()));
        }
        if name.chars().any(char::is_control) {
            return Err(PlatformError::ValidationError(
                "Application name contains control characters".to_string(),
            ));
        }
        let subdomain = normalize_hostname(&new.subdomain)
            .filter(|label| !label.contains('.'))
            .ok_or_else(|| {
                PlatformError::ValidationError(format!("Invalid subdomain '{}'", new.subdomain))
            })?;

        let id = generate_uuid();
        let primary = format!("{}.{}", subdomain, self.proxy.base_domain());
        self.apps.claim_hostname(&primary, &id).await?;

        let port = match self.ports.allocate(&id).await {
            Ok(port) => port,
            Err(e) => {
                self.release_hostname(&primary, &id).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let app = Application {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            name,
            subdomain,
            domains: Default::default(),
            port,
            status: AppStatus::Stopped,
            pid: None,
            active_deployment_id: None,
            env: new.env,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.apps.create(&app).await {
            self.release_hostname(&primary, &id).await;
            if let Err(e) = self.ports.release(port).await {
                warn!(port = port, "Failed to release port: {}", e);
            }
            return Err(e);
        }

        info!(app_id = %app.id, owner_id = %owner_id, port = port, host = %primary, "Application created");
        self.sync_routes(&app).await;
        Ok(app)
    }

    /// Delete an application: stop its process, remove its routes, releases,
    /// logs and hostnames, then free its port
    pub async fn delete_app(&self, owner_id: &str, app_id: &str) -> Result<(), PlatformError> {
        let guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;

        self.supervisor.stop(&app.id).await?;
        self.pipeline.remove_all(&app.id).await?;
        self.fanout.forget(&app.id).await;
        self.apps.delete(&app.id).await?;

        // Claims outlive the record so nothing can take them over a half-deleted app
        if let Err(e) = self.proxy.remove(&app.id).await {
            warn!(app_id = %app.id, "Routes removed, proxy not yet reloaded: {}", e);
        }
        for host in app.hostnames(self.proxy.base_domain()) {
            self.release_hostname(&host, &app.id).await;
        }
        self.ports.release(app.port).await?;

        drop(guard);
        self.locks.forget(&app.id);

        info!(app_id = %app.id, port = app.port, "Application deleted");
        Ok(())
    }

    pub async fn get_app(&self, owner_id: &str, app_id: &str) -> Result<Application, PlatformError> {
        self.resolve_owned(owner_id, app_id).await
    }

    /// Applications owned by `owner_id`
    pub async fn list_apps(&self, owner_id: &str) -> Result<Vec<Application>, PlatformError> {
        Ok(self
            .apps
            .list()
            .await?
            .into_iter()
            .filter(|app| app.owner_id == owner_id)
            .collect())
    }

    /// Every application, regardless of owner
    pub async fn all_apps(&self) -> Result<Vec<Application>, PlatformError> {
        self.apps.list().await
    }

    /// Replace the user environment. Takes effect on the next start.
    pub async fn set_env(
        &self,
        owner_id: &str,
        app_id: &str,
        env: BTreeMap<String, String>,
    ) -> Result<Application, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        self.resolve_owned(owner_id, app_id).await?;
        self.apps.update(app_id, |app| app.env = env.clone()).await
    }

    // ---- lifecycle ----

    pub async fn deploy(
        &self,
        owner_id: &str,
        app_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Deployment, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;

        self.pipeline
            .deploy(
                &app,
                Upload {
                    file_name: file_name.to_string(),
                    bytes,
                    initiated_by: owner_id.to_string(),
                },
            )
            .await
    }

    /// Start the active release. Restarts it if already running.
    pub async fn start(&self, owner_id: &str, app_id: &str) -> Result<ProcessInfo, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;
        let release = self.pipeline.active_release(&app).await?;
        self.supervisor.start(&app, &release).await
    }

    /// Stop the process. Returns false if nothing was running.
    pub async fn stop(&self, owner_id: &str, app_id: &str) -> Result<bool, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;
        self.supervisor.stop(&app.id).await
    }

    pub async fn restart(&self, owner_id: &str, app_id: &str) -> Result<ProcessInfo, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;
        let release = self.pipeline.active_release(&app).await?;
        self.supervisor.restart(&app, &release).await
    }

    pub async fn rollback(
        &self,
        owner_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> Result<Deployment, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;
        self.pipeline.rollback(&app, deployment_id).await
    }

    /// Deployment history, oldest first
    pub async fn list_deployments(&self, owner_id: &str, app_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        let app = self.resolve_owned(owner_id, app_id).await?;
        self.pipeline.list(&app.id).await
    }

    // ---- domains ----

    pub async fn add_domain(&self, owner_id: &str, app_id: &str, domain: &str) -> Result<Application, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;
        let host = valid_domain(domain)?;

        if app.primary_hostname(self.proxy.base_domain()) == host {
            return Err(PlatformError::Conflict(format!(
                "{} is already the primary hostname of {}",
                host, app.id
            )));
        }
        if app.domains.contains(&host) {
            return Ok(app);
        }

        self.apps.claim_hostname(&host, &app.id).await?;
        let app = match self
            .apps
            .update(&app.id, |record| {
                record.domains.insert(host.clone());
            })
            .await
        {
            Ok(app) => app,
            Err(e) => {
                self.release_hostname(&host, &app.id).await;
                return Err(e);
            }
        };

        info!(app_id = %app.id, domain = %host, "Domain added");
        self.sync_routes(&app).await;
        Ok(app)
    }

    pub async fn remove_domain(
        &self,
        owner_id: &str,
        app_id: &str,
        domain: &str,
    ) -> Result<Application, PlatformError> {
        let _guard = self.locks.lock(app_id).await;
        let app = self.resolve_owned(owner_id, app_id).await?;
        let host = valid_domain(domain)?;

        if !app.domains.contains(&host) {
            return Err(PlatformError::NotFound(format!(
                "Domain {} is not attached to {}",
                host, app.id
            )));
        }

        let app = self
            .apps
            .update(&app.id, |record| {
                record.domains.remove(&host);
            })
            .await?;
        self.release_hostname(&host, &app.id).await;

        info!(app_id = %app.id, domain = %host, "Domain removed");
        self.sync_routes(&app).await;
        Ok(app)
    }

    // ---- logs ----

    /// Most recent log entries, newest first
    pub async fn get_logs(&self, owner_id: &str, app_id: &str, limit: usize) -> Result<Vec<LogEntry>, PlatformError> {
        let app = self.resolve_owned(owner_id, app_id).await?;
        self.fanout.recent(&app.id, limit).await
    }

    /// Open a live log connection
    pub fn connect_logs(&self) -> (ConnectionId, LogReceiver) {
        self.fanout.connect()
    }

    /// Subscribe a connection to an application's logs; returns the number of
    /// replayed entries
    pub async fn subscribe_logs(
        &self,
        owner_id: &str,
        connection: ConnectionId,
        app_id: &str,
    ) -> Result<usize, PlatformError> {
        let app = self.resolve_owned(owner_id, app_id).await?;
        self.fanout.subscribe(connection, &app.id).await
    }

    pub async fn unsubscribe_logs(&self, connection: ConnectionId, app_id: &str) {
        self.fanout.unsubscribe(connection, app_id).await;
    }

    pub async fn disconnect_logs(&self, connection: ConnectionId) {
        self.fanout.disconnect(connection).await;
    }

    // ---- observation ----

    /// Probe a running application's liveness endpoint. `None` when no
    /// process is running.
    pub async fn check_health(&self, app_id: &str) -> Result<Option<HealthReport>, PlatformError> {
        let app = self.apps.require(app_id).await?;
        if !self.supervisor.is_running(&app.id) {
            return Ok(None);
        }
        Ok(Some(self.health.probe(app.port).await))
    }

    /// Probe every running application
    pub async fn check_all_health(&self) -> Result<Vec<(String, HealthReport)>, PlatformError> {
        let mut reports = Vec::new();
        for process in self.supervisor.processes() {
            if let Some(report) = self.check_health(&process.app_id).await? {
                reports.push((process.app_id, report));
            }
        }
        Ok(reports)
    }

    /// Advisory resource usage of a running application
    pub async fn metrics(&self, app_id: &str) -> Result<Option<ProcessMetrics>, PlatformError> {
        self.apps.require(app_id).await?;
        match self.supervisor.pid(app_id) {
            Some(pid) => Ok(telemetry::process_metrics(pid).await),
            None => Ok(None),
        }
    }

    pub async fn app(&self, app_id: &str) -> Result<Application, PlatformError> {
        self.apps.require(app_id).await
    }

    // ---- platform lifecycle ----

    /// Reset state a previous run left behind: nothing is running after a
    /// platform start, so statuses claiming a process become `stopped`.
    /// Routes are regenerated for every application.
    pub async fn recover(&self) -> Result<RecoveryReport, PlatformError> {
        let mut report = RecoveryReport::default();

        for app in self.apps.list().await? {
            if app.status.implies_process() || app.pid.is_some() {
                self.apps
                    .update(&app.id, |record| {
                        if record.status.implies_process() {
                            record.status = AppStatus::Stopped;
                        }
                        record.pid = None;
                    })
                    .await?;
                report.apps_reset += 1;
            }

            let (failed, removed) = self.pipeline.recover(&app.id).await?;
            report.deployments_failed += failed;
            report.releases_removed += removed;
        }

        if let Err(e) = self.converge_proxy().await {
            warn!("Initial route convergence failed: {}", e);
        }

        info!(
            apps_reset = report.apps_reset,
            deployments_failed = report.deployments_failed,
            releases_removed = report.releases_removed,
            "Recovery complete"
        );
        Ok(report)
    }

    /// Rewrite every application's routes and reload the proxy
    pub async fn converge_proxy(&self) -> Result<(), PlatformError> {
        self.proxy.converge(|| self.apps.list()).await
    }

    /// Stop every supervised process
    pub async fn shutdown(&self) -> usize {
        self.supervisor.stop_all().await
    }

    // ---- helpers ----

    /// Resolve an application and check that `owner_id` owns it
    pub async fn resolve_owned(&self, owner_id: &str, app_id: &str) -> Result<Application, PlatformError> {
        let app = self.apps.require(app_id).await?;
        if app.owner_id != owner_id {
            return Err(PlatformError::Forbidden(format!(
                "Application {} belongs to another user",
                app_id
            )));
        }
        Ok(app)
    }

    async fn sync_routes(&self, app: &Application) {
        if let Err(e) = self.proxy.sync(app).await {
            warn!(app_id = %app.id, "Routes will be retried: {}", e);
        }
    }

    async fn release_hostname(&self, host: &str, app_id: &str) {
        if let Err(e) = self.apps.release_hostname(host, app_id).await {
            warn!(host = %host, app_id = %app_id, "Failed to release hostname: {}", e);
        }
    }
}

fn valid_domain(raw: &str) -> Result<String, PlatformError> {
    normalize_hostname(raw)
        .filter(|host| host.contains('.'))
        .ok_or_else(|| PlatformError::ValidationError(format!("Invalid domain '{}'", raw)))
}
