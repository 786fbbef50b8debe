//! Atomically repointable "current" indirection
//!
//! On Unix this is a symbolic link replaced with `rename(2)`: a temporary
//! link is created next to the real one and renamed over it, so a reader that
//! resolves the path sees either the previous release or the new one, never a
//! missing or half-switched link. Elsewhere a pointer file holding the target
//! path is swapped the same way.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::PlatformError;

/// A named pointer to exactly one directory at a time
#[derive(Debug, Clone)]
pub struct Link {
    path: PathBuf,
}

impl Link {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Repoint the link at `target` in a single rename
    pub async fn point_to(&self, target: &Path) -> Result<(), PlatformError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging = self
            .path
            .with_file_name(format!(".current.{}", uuid::Uuid::new_v4()));

        #[cfg(unix)]
        fs::symlink(target, &staging).await?;

        #[cfg(not(unix))]
        fs::write(&staging, target.to_string_lossy().as_bytes()).await?;

        if let Err(e) = fs::rename(&staging, &self.path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// The directory the link currently points at, if any
    pub async fn target(&self) -> Result<Option<PathBuf>, PlatformError> {
        #[cfg(unix)]
        let result = fs::read_link(&self.path).await;

        #[cfg(not(unix))]
        let result = fs::read_to_string(&self.path).await.map(PathBuf::from);

        match result {
            Ok(target) => Ok(Some(target)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the link itself, never its target
    pub async fn remove(&self) -> Result<(), PlatformError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
