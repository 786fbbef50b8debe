//! Application records and hostname claims

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::errors::PlatformError;
use crate::models::app::Application;
use crate::store::{decode, encode, keys, update_json, ScanOptions, Store};

/// Typed access to application records
#[derive(Clone)]
pub struct AppRepository {
    store: Arc<dyn Store>,
}

impl AppRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, app_id: &str) -> Result<Option<Application>, PlatformError> {
        match self.store.get(&keys::app(app_id)).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    /// Get an application or fail with `NotFound`
    pub async fn require(&self, app_id: &str) -> Result<Application, PlatformError> {
        self.get(app_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("Application {}", app_id)))
    }

    /// Insert a new record; fails with `Conflict` if the id is taken
    pub async fn create(&self, app: &Application) -> Result<(), PlatformError> {
        let created = self
            .store
            .compare_and_swap(&keys::app(&app.id), None, Some(encode(app)?))
            .await?;
        if !created {
            return Err(PlatformError::Conflict(format!(
                "Application id {} already exists",
                app.id
            )));
        }
        Ok(())
    }

    /// Atomically modify a record, stamping `updated_at`
    pub async fn update<F>(&self, app_id: &str, mut mutate: F) -> Result<Application, PlatformError>
    where
        F: FnMut(&mut Application),
    {
        update_json(self.store.as_ref(), &keys::app(app_id), |app: &mut Application| {
            mutate(app);
            app.updated_at = Utc::now();
        })
        .await?
        .ok_or_else(|| PlatformError::NotFound(format!("Application {}", app_id)))
    }

    pub async fn delete(&self, app_id: &str) -> Result<(), PlatformError> {
        self.store.delete(&keys::app(app_id)).await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Application>, PlatformError> {
        self.store
            .scan(keys::APP_PREFIX, ScanOptions::default())
            .await?
            .into_iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Claim a hostname for an application. Hostnames are unique across
    /// every application's subdomain and custom domains.
    pub async fn claim_hostname(&self, hostname: &str, app_id: &str) -> Result<(), PlatformError> {
        let key = keys::host(hostname);
        let owner = Value::String(app_id.to_string());

        if self
            .store
            .compare_and_swap(&key, None, Some(owner.clone()))
            .await?
        {
            return Ok(());
        }

        match self.store.get(&key).await? {
            Some(current) if current == owner => Ok(()),
            _ => Err(PlatformError::Conflict(format!(
                "Hostname {} is already taken",
                hostname
            ))),
        }
    }

    /// Release a hostname, but only if `app_id` still owns it
    pub async fn release_hostname(&self, hostname: &str, app_id: &str) -> Result<(), PlatformError> {
        let owner = Value::String(app_id.to_string());
        self.store
            .compare_and_swap(&keys::host(hostname), Some(&owner), None)
            .await?;
        Ok(())
    }

    /// The application owning a hostname, if any
    pub async fn hostname_owner(&self, hostname: &str) -> Result<Option<String>, PlatformError> {
        Ok(self
            .store
            .get(&keys::host(hostname))
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}
