//! Deployment history

use std::sync::Arc;

use crate::errors::PlatformError;
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::store::{decode, encode, keys, ScanOptions, Store};

/// Typed access to deployment records, keyed by (app, version)
#[derive(Clone)]
pub struct DeploymentRepository {
    store: Arc<dyn Store>,
}

impl DeploymentRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Highest version recorded for an application, 0 if none
    pub async fn latest_version(&self, app_id: &str) -> Result<u32, PlatformError> {
        let newest = self
            .store
            .scan(&keys::deployments(app_id), ScanOptions::newest_first(1))
            .await?;
        match newest.into_iter().next() {
            Some((_, value)) => Ok(decode::<Deployment>(value)?.version),
            None => Ok(0),
        }
    }

    /// Persist a new deployment under the next free version number.
    ///
    /// The version is claimed with a create-only write, so two concurrent
    /// callers can never end up with the same number.
    pub async fn create_next(&self, mut deployment: Deployment) -> Result<Deployment, PlatformError> {
        let mut version = self.latest_version(&deployment.app_id).await? + 1;
        loop {
            deployment.version = version;
            let key = keys::deployment(&deployment.app_id, version);
            if self
                .store
                .compare_and_swap(&key, None, Some(encode(&deployment)?))
                .await?
            {
                return Ok(deployment);
            }
            version += 1;
        }
    }

    /// Overwrite an existing deployment record
    pub async fn save(&self, deployment: &Deployment) -> Result<(), PlatformError> {
        let key = keys::deployment(&deployment.app_id, deployment.version);
        self.store.put(&key, encode(deployment)?, None).await
    }

    /// All deployments of an application, oldest first
    pub async fn list(&self, app_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        self.store
            .scan(&keys::deployments(app_id), ScanOptions::default())
            .await?
            .into_iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Find a deployment of an application by id
    pub async fn find(&self, app_id: &str, deployment_id: &str) -> Result<Deployment, PlatformError> {
        self.list(app_id)
            .await?
            .into_iter()
            .find(|d| d.id == deployment_id)
            .ok_or_else(|| PlatformError::NotFound(format!("Deployment {}", deployment_id)))
    }

    /// Deployments currently marked active (at most one when the invariant holds)
    pub async fn active(&self, app_id: &str) -> Result<Vec<Deployment>, PlatformError> {
        Ok(self
            .list(app_id)
            .await?
            .into_iter()
            .filter(|d| d.status == DeploymentStatus::Active)
            .collect())
    }

    pub async fn delete(&self, deployment: &Deployment) -> Result<(), PlatformError> {
        self.store
            .delete(&keys::deployment(&deployment.app_id, deployment.version))
            .await?;
        Ok(())
    }
}
