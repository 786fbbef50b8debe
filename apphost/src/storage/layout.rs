//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::PlatformError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::filesys::link::Link;

/// On-disk layout of the platform data directory
///
/// ```text
/// <base>/settings.json
/// <base>/store.json
/// <base>/apps/<app_id>/releases/<deployment_id>/...
/// <base>/apps/<app_id>/current -> releases/<deployment_id>
/// <base>/proxy/<app_id>.caddy
/// <base>/tmp/
/// <base>/logs/
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the store snapshot file
    pub fn store_file(&self) -> File {
        File::new(self.base_dir.join("store.json"))
    }

    /// Get the directory holding every application's files
    pub fn apps_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("apps"))
    }

    /// Get one application's directory
    pub fn app_dir(&self, app_id: &str) -> Dir {
        self.apps_dir().subdir(app_id)
    }

    /// Get the releases collection of an application
    pub fn releases_dir(&self, app_id: &str) -> Dir {
        self.app_dir(app_id).subdir("releases")
    }

    /// Get the directory of one release
    pub fn release_dir(&self, app_id: &str, deployment_id: &str) -> Dir {
        self.releases_dir(app_id).subdir(deployment_id)
    }

    /// Get the "current" indirection of an application
    pub fn current_link(&self, app_id: &str) -> Link {
        Link::new(self.app_dir(app_id).path().join("current"))
    }

    /// Get the default reverse-proxy configuration directory
    pub fn proxy_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("proxy"))
    }

    /// Get the scratch directory for uploads
    pub fn tmp_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("tmp"))
    }

    /// Get the platform log directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), PlatformError> {
        self.apps_dir().create().await?;
        self.proxy_dir().create().await?;
        self.tmp_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/apphost");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".apphost");

        Self::new(base_dir)
    }
}
