//! Artifact materialization
//!
//! Turns uploaded bytes into a release directory: a single file becomes the
//! entry point, a zip archive is extracted in place.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::errors::PlatformError;
use crate::filesys::dir::Dir;
use crate::utils::generate_uuid;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Kind of an uploaded artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Used as the entry point as-is
    SingleFile,

    /// Zip archive extracted into the release
    Archive,
}

impl ArtifactKind {
    /// Detect from the file name, falling back to the zip magic number
    pub fn detect(file_name: &str, bytes: &[u8]) -> Self {
        if file_name.to_ascii_lowercase().ends_with(".zip") || bytes.starts_with(ZIP_MAGIC) {
            ArtifactKind::Archive
        } else {
            ArtifactKind::SingleFile
        }
    }
}

/// What was written into a release directory
#[derive(Debug, Clone)]
pub struct Materialized {
    pub kind: ArtifactKind,
    pub files: usize,
    pub entry_point: PathBuf,
}

/// Materialize an artifact into `release` and validate its entry point.
///
/// Archives are staged in `tmp` and the staged copy is removed afterwards,
/// whether extraction succeeded or not. No release may hold more than
/// `max_bytes` of unpacked content.
pub async fn materialize(
    bytes: &[u8],
    file_name: &str,
    release: &Dir,
    tmp: &Dir,
    entry_point: &str,
    max_bytes: u64,
) -> Result<Materialized, PlatformError> {
    if bytes.is_empty() {
        return Err(PlatformError::ArtifactError("Artifact is empty".to_string()));
    }
    if bytes.len() as u64 > max_bytes {
        return Err(too_large(file_name, max_bytes));
    }

    release.create().await?;
    let kind = ArtifactKind::detect(file_name, bytes);

    let files = match kind {
        ArtifactKind::SingleFile => {
            release.file(entry_point).write_bytes(bytes).await?;
            1
        }
        ArtifactKind::Archive => {
            let staged = tmp.file(&format!("{}.zip", generate_uuid()));
            staged.write_bytes(bytes).await?;

            let archive_path = staged.path().to_path_buf();
            let target = release.path().to_path_buf();
            let extracted = tokio::task::spawn_blocking(move || extract_zip(&archive_path, &target, max_bytes))
                .await
                .map_err(|e| PlatformError::Internal(format!("Extraction task failed: {}", e)));

            if let Err(e) = staged.delete().await {
                warn!(path = %staged.path().display(), "Failed to remove staged archive: {}", e);
            }
            extracted??
        }
    };

    let entry = release.file(entry_point);
    if !entry.exists().await {
        return Err(PlatformError::ArtifactError(format!(
            "Entry point '{}' not found in artifact '{}'",
            entry_point, file_name
        )));
    }
    entry.set_executable().await?;

    debug!(release = %release.path().display(), files = files, kind = ?kind, "Artifact materialized");

    Ok(Materialized {
        kind,
        files,
        entry_point: entry.path().to_path_buf(),
    })
}

fn too_large(name: &str, max_bytes: u64) -> PlatformError {
    PlatformError::ArtifactError(format!("'{}' unpacks to more than {} bytes", name, max_bytes))
}

/// Extract every entry of a zip file under `target`, rejecting entries that
/// would escape it. Declared sizes are checked against the remaining budget
/// before anything is written and the actual bytes are counted while
/// streaming, so a forged header can neither reserve nor write more than
/// `max_bytes`. Returns the number of files written.
fn extract_zip(archive_path: &Path, target: &Path, max_bytes: u64) -> Result<usize, PlatformError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(std::io::BufReader::new(file))
        .map_err(|e| PlatformError::ArtifactError(format!("Failed to read archive: {}", e)))?;

    let mut remaining = max_bytes;
    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            PlatformError::ArtifactError(format!("Failed to read archive entry {}: {}", i, e))
        })?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(PlatformError::ArtifactError(format!(
                "Archive entry '{}' escapes the release directory",
                entry.name()
            )));
        };
        let path = target.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&path)?;
            continue;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let name = entry.name().to_string();
        if entry.size() > remaining {
            return Err(too_large(&name, max_bytes));
        }

        let mut out = std::fs::File::create(&path)?;
        let written = std::io::copy(&mut (&mut entry).take(remaining + 1), &mut out)
            .map_err(|e| PlatformError::ArtifactError(format!("Failed to read '{}': {}", name, e)))?;
        if written > remaining {
            drop(out);
            let _ = std::fs::remove_file(&path);
            return Err(too_large(&name, max_bytes));
        }
        remaining -= written;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode & 0o777))?;
        }

        files += 1;
    }

    Ok(files)
}
