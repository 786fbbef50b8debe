//! Deployment pipeline
//!
//! deploy: record (building) -> materialize -> validate -> activate -> restart
//! rollback: activate an inactive release -> restart
//!
//! Activation demotes the previously active release before promoting the new
//! one, so no interruption can leave two releases active. A failure before
//! the restart leaves the previously served release and process untouched.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::deploy::artifact;
use crate::deploy::fsm::{self, DeploymentEvent};
use crate::errors::PlatformError;
use crate::filesys::dir::Dir;
use crate::models::app::{AppStatus, Application};
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::storage::layout::StorageLayout;
use crate::store::apps::AppRepository;
use crate::store::deployments::DeploymentRepository;
use crate::supervisor::Supervisor;
use crate::utils::{generate_uuid, sha256_hash};

/// Pipeline options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Executable every release must contain
    pub entry_point: String,

    /// Number of deployments retained per application
    pub max_deployments: usize,

    /// Upper bound on the unpacked size of a release
    pub max_release_bytes: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            entry_point: "start".to_string(),
            max_deployments: 5,
            max_release_bytes: 1 << 30,
        }
    }
}

/// An uploaded artifact
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub initiated_by: String,
}

/// Builds, activates and retires releases
pub struct DeploymentPipeline {
    layout: StorageLayout,
    apps: AppRepository,
    deployments: DeploymentRepository,
    supervisor: Arc<Supervisor>,
    options: PipelineOptions,
}

impl DeploymentPipeline {
    pub fn new(
        layout: StorageLayout,
        apps: AppRepository,
        deployments: DeploymentRepository,
        supervisor: Arc<Supervisor>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            layout,
            apps,
            deployments,
            supervisor,
            options,
        }
    }

    /// Deploy an uploaded artifact as the application's next version
    pub async fn deploy(&self, app: &Application, upload: Upload) -> Result<Deployment, PlatformError> {
        let id = generate_uuid();
        let release = self.layout.release_dir(&app.id, &id);

        let mut deployment = Deployment {
            id,
            app_id: app.id.clone(),
            version: 0,
            created_at: Utc::now(),
            initiated_by: upload.initiated_by.clone(),
            status: DeploymentStatus::Pending,
            artifact_path: release.path().to_path_buf(),
            artifact_name: upload.file_name.clone(),
            artifact_sha256: sha256_hash(&upload.bytes),
            build_log: String::new(),
            error_message: None,
        };
        fsm::advance(&mut deployment, DeploymentEvent::Build)?;
        deployment.log(format!(
            "Received {} ({} bytes, sha256 {})",
            upload.file_name,
            upload.bytes.len(),
            deployment.artifact_sha256
        ));

        let mut deployment = self.deployments.create_next(deployment).await?;
        info!(
            app_id = %app.id,
            deployment_id = %deployment.id,
            version = deployment.version,
            "Deployment started"
        );

        let materialized = match artifact::materialize(
            &upload.bytes,
            &upload.file_name,
            &release,
            &self.layout.tmp_dir(),
            &self.options.entry_point,
            self.options.max_release_bytes,
        )
        .await
        {
            Ok(materialized) => materialized,
            Err(e) => return Err(self.fail(deployment, &release, e).await),
        };
        deployment.log(format!(
            "Materialized {} file(s), entry point {}",
            materialized.files,
            materialized.entry_point.display()
        ));

        let previous_status = app.status;
        if let Err(e) = self.set_status(&app.id, AppStatus::Building).await {
            return Err(self.fail(deployment, &release, e).await);
        }

        let app = match self.activate(app, &mut deployment, DeploymentEvent::Activate).await {
            Ok(app) => app,
            Err(e) => {
                self.restore_status(&app.id, previous_status).await;
                return Err(self.fail(deployment, &release, e).await);
            }
        };

        self.run(&app, &mut deployment).await?;
        self.cleanup(&app.id).await;

        info!(
            app_id = %app.id,
            deployment_id = %deployment.id,
            version = deployment.version,
            "Deployment active"
        );
        Ok(deployment)
    }

    /// Serve a previously active release again
    pub async fn rollback(&self, app: &Application, deployment_id: &str) -> Result<Deployment, PlatformError> {
        let mut target = self.deployments.find(&app.id, deployment_id).await?;
        if target.status != DeploymentStatus::Inactive {
            return Err(PlatformError::Conflict(format!(
                "Deployment v{} is {}; only inactive deployments can be rolled back to",
                target.version, target.status
            )));
        }
        if !Dir::new(&target.artifact_path).exists().await {
            return Err(PlatformError::ArtifactError(format!(
                "Release of v{} is no longer on disk",
                target.version
            )));
        }

        let previous_status = app.status;
        self.set_status(&app.id, AppStatus::Building).await?;

        let app = match self.activate(app, &mut target, DeploymentEvent::Restore).await {
            Ok(app) => app,
            Err(e) => {
                self.restore_status(&app.id, previous_status).await;
                return Err(e);
            }
        };

        self.run(&app, &mut target).await?;
        info!(
            app_id = %app.id,
            deployment_id = %target.id,
            version = target.version,
            "Rolled back"
        );
        Ok(target)
    }

    /// Prune the oldest non-active deployments beyond the retention cap.
    /// Failures are logged and skipped. Returns how many were pruned.
    pub async fn cleanup(&self, app_id: &str) -> usize {
        let deployments = match self.deployments.list(app_id).await {
            Ok(deployments) => deployments,
            Err(e) => {
                warn!(app_id = %app_id, "Failed to list deployments for cleanup: {}", e);
                return 0;
            }
        };

        let excess = deployments.len().saturating_sub(self.options.max_deployments.max(1));
        let mut pruned = 0;

        for deployment in deployments
            .iter()
            .filter(|d| matches!(d.status, DeploymentStatus::Inactive | DeploymentStatus::Failed))
            .take(excess)
        {
            if let Err(e) = Dir::new(&deployment.artifact_path).delete().await {
                warn!(deployment_id = %deployment.id, "Failed to delete release: {}", e);
                continue;
            }
            if let Err(e) = self.deployments.delete(deployment).await {
                warn!(deployment_id = %deployment.id, "Failed to delete deployment record: {}", e);
                continue;
            }
            info!(app_id = %app_id, version = deployment.version, "Pruned deployment");
            pruned += 1;
        }

        pruned
    }

    /// Release directory of the application's active deployment
    pub async fn active_release(&self, app: &Application) -> Result<PathBuf, PlatformError> {
        let Some(deployment_id) = &app.active_deployment_id else {
            return Err(PlatformError::ValidationError(format!(
                "Application {} has no active deployment",
                app.id
            )));
        };
        Ok(self.deployments.find(&app.id, deployment_id).await?.artifact_path)
    }

    /// Delete every release and deployment record of an application
    pub async fn remove_all(&self, app_id: &str) -> Result<(), PlatformError> {
        for deployment in self.deployments.list(app_id).await? {
            self.deployments.delete(&deployment).await?;
        }
        self.layout.app_dir(app_id).delete().await
    }

    pub async fn list(&self, app_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        self.deployments.list(app_id).await
    }

    /// Fail deployments a platform restart interrupted and delete release
    /// directories no record refers to. Returns (failed, removed).
    pub async fn recover(&self, app_id: &str) -> Result<(usize, usize), PlatformError> {
        let deployments = self.deployments.list(app_id).await?;

        let mut failed = 0;
        for deployment in &deployments {
            if !matches!(deployment.status, DeploymentStatus::Pending | DeploymentStatus::Building) {
                continue;
            }
            let mut deployment = deployment.clone();
            deployment.log("Interrupted by platform restart");
            fsm::advance(
                &mut deployment,
                DeploymentEvent::Fail("Interrupted by platform restart".to_string()),
            )?;
            self.deployments.save(&deployment).await?;
            if let Err(e) = Dir::new(&deployment.artifact_path).delete().await {
                warn!(deployment_id = %deployment.id, "Failed to remove interrupted release: {}", e);
            }
            failed += 1;
        }

        let releases = self.layout.releases_dir(app_id);
        let mut removed = 0;
        for name in releases.list_dirs().await? {
            if deployments.iter().any(|d| d.id == name) {
                continue;
            }
            match releases.subdir(&name).delete().await {
                Ok(()) => removed += 1,
                Err(e) => warn!(app_id = %app_id, release = %name, "Failed to remove orphaned release: {}", e),
            }
        }

        Ok((failed, removed))
    }

    /// Repoint `current`, demote the active release, promote `target` and
    /// record it on the application. Undone as far as possible on failure.
    async fn activate(
        &self,
        app: &Application,
        target: &mut Deployment,
        event: DeploymentEvent,
    ) -> Result<Application, PlatformError> {
        let mut promoted = target.clone();
        fsm::advance(&mut promoted, event)?;
        promoted.log(format!("Activated at {}", Utc::now().to_rfc3339()));

        let link = self.layout.current_link(&app.id);
        let previous_target = link.target().await?;
        link.point_to(&target.artifact_path).await?;

        let mut demoted = Vec::new();
        match self.commit_activation(&app.id, &promoted, &mut demoted).await {
            Ok(app) => {
                *target = promoted;
                Ok(app)
            }
            Err(e) => {
                error!(app_id = %app.id, deployment_id = %target.id, "Activation failed: {}", e);
                self.revert_activation(&app.id, previous_target, target, demoted).await;
                Err(e)
            }
        }
    }

    async fn commit_activation(
        &self,
        app_id: &str,
        promoted: &Deployment,
        demoted: &mut Vec<Deployment>,
    ) -> Result<Application, PlatformError> {
        for mut other in self.deployments.active(app_id).await? {
            if other.id == promoted.id {
                continue;
            }
            fsm::advance(&mut other, DeploymentEvent::Supersede)?;
            other.log(format!("Superseded by v{}", promoted.version));
            self.deployments.save(&other).await?;
            demoted.push(other);
        }

        self.deployments.save(promoted).await?;

        let deployment_id = promoted.id.clone();
        self.apps
            .update(app_id, |record| {
                record.active_deployment_id = Some(deployment_id.clone());
            })
            .await
    }

    /// Put the link, `target` and every demoted deployment back the way
    /// they were before [`Self::activate`] touched them
    async fn revert_activation(
        &self,
        app_id: &str,
        previous_target: Option<PathBuf>,
        target: &Deployment,
        demoted: Vec<Deployment>,
    ) {
        let link = self.layout.current_link(app_id);
        let relinked = match &previous_target {
            Some(path) => link.point_to(path).await,
            None => link.remove().await,
        };
        if let Err(e) = relinked {
            error!(app_id = %app_id, "Failed to restore current release link: {}", e);
        }

        if let Err(e) = self.deployments.save(target).await {
            error!(deployment_id = %target.id, "Failed to restore deployment {}: {}", target.status, e);
        }

        for mut deployment in demoted {
            if fsm::advance(&mut deployment, DeploymentEvent::Restore).is_ok() {
                if let Err(e) = self.deployments.save(&deployment).await {
                    error!(deployment_id = %deployment.id, "Failed to restore active deployment: {}", e);
                }
            }
        }
    }

    async fn run(&self, app: &Application, deployment: &mut Deployment) -> Result<(), PlatformError> {
        let result = self.supervisor.restart(app, &deployment.artifact_path).await;

        match &result {
            Ok(process) => deployment.log(format!("Started with pid {:?}", process.pid)),
            Err(e) => deployment.log(format!("Start failed: {}", e)),
        }
        if let Err(e) = self.deployments.save(deployment).await {
            warn!(deployment_id = %deployment.id, "Failed to save build log: {}", e);
        }

        result.map(|_| ())
    }

    async fn fail(&self, mut deployment: Deployment, release: &Dir, error: PlatformError) -> PlatformError {
        let message = error.to_string();
        error!(
            app_id = %deployment.app_id,
            deployment_id = %deployment.id,
            version = deployment.version,
            "Deployment failed: {}",
            message
        );

        deployment.log(format!("Failed: {}", message));
        if let Err(e) = fsm::advance(&mut deployment, DeploymentEvent::Fail(message)) {
            warn!(deployment_id = %deployment.id, "{}", e);
        }
        if let Err(e) = self.deployments.save(&deployment).await {
            error!(deployment_id = %deployment.id, "Failed to record deployment failure: {}", e);
        }
        if let Err(e) = release.delete().await {
            warn!(path = %release.path().display(), "Failed to remove failed release: {}", e);
        }

        error
    }

    async fn set_status(&self, app_id: &str, status: AppStatus) -> Result<(), PlatformError> {
        self.apps
            .update(app_id, |record| record.status = status)
            .await
            .map(|_| ())
    }

    async fn restore_status(&self, app_id: &str, status: AppStatus) {
        if let Err(e) = self.set_status(app_id, status).await {
            warn!(app_id = %app_id, status = %status, "Failed to restore application status: {}", e);
        }
    }
}
