//! Versioned release archives and scoped workspaces.
//!
//! Every archived release lives under `<root>/archives/<app_id>/<sequence>/`.
//! A check cycle never touches the archive directly: it gets an
//! [`ArchiveWorkspace`], a private copy under `<root>/workspaces/` that is
//! deleted when the workspace is released or dropped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use shipcheck_core::AppId;

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("No archived release for application {app_id} at sequence {sequence}")]
    VersionNotFound { app_id: AppId, sequence: i64 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive task failed: {0}")]
    Join(String),
}

impl ArchiveError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Exclusively owned directory holding one release's files.
///
/// Released exactly once: either explicitly through [`release`](Self::release)
/// or, on any other exit path, when dropped.
#[derive(Debug)]
pub struct ArchiveWorkspace {
    path: PathBuf,
    released: bool,
}

impl ArchiveWorkspace {
    /// Take ownership of an existing directory.
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the workspace directory.
    pub async fn release(mut self) -> Result<(), ArchiveError> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Released archive workspace");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArchiveError::io(
                format!("failed to remove workspace {}", self.path.display()),
                e,
            )),
        }
    }
}

impl Drop for ArchiveWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove dropped workspace");
            }
        }
    }
}

/// Source of per-release workspaces.
#[async_trait]
pub trait VersionArchive: Send + Sync {
    /// Check out the release `sequence` of `app_id` into a fresh workspace.
    async fn workspace(&self, app_id: &AppId, sequence: i64) -> Result<ArchiveWorkspace, ArchiveError>;

    /// Archive `source` as the next sequence of `app_id` and return it.
    async fn store_version(&self, app_id: &AppId, source: &Path) -> Result<i64, ArchiveError>;
}

/// Filesystem-backed archive.
pub struct FsVersionArchive {
    root: PathBuf,
}

impl FsVersionArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn app_dir(&self, app_id: &AppId) -> PathBuf {
        self.root.join("archives").join(app_id.as_str())
    }

    fn version_dir(&self, app_id: &AppId, sequence: i64) -> PathBuf {
        self.app_dir(app_id).join(sequence.to_string())
    }

    fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }
}

#[async_trait]
impl VersionArchive for FsVersionArchive {
    async fn workspace(&self, app_id: &AppId, sequence: i64) -> Result<ArchiveWorkspace, ArchiveError> {
        let source = self.version_dir(app_id, sequence);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(ArchiveError::VersionNotFound {
                app_id: app_id.clone(),
                sequence,
            });
        }

        let target = self.workspaces_dir().join(Uuid::new_v4().to_string());
        let dest = target.clone();
        tokio::task::spawn_blocking(move || copy_dir(&source, &dest))
            .await
            .map_err(|e| ArchiveError::Join(e.to_string()))??;

        debug!(app_id = %app_id, sequence, path = %target.display(), "Checked out archive workspace");
        Ok(ArchiveWorkspace::adopt(target))
    }

    async fn store_version(&self, app_id: &AppId, source: &Path) -> Result<i64, ArchiveError> {
        let app_dir = self.app_dir(app_id);
        let next = {
            let dir = app_dir.clone();
            tokio::task::spawn_blocking(move || latest_sequence(&dir))
                .await
                .map_err(|e| ArchiveError::Join(e.to_string()))??
                .map_or(0, |latest| latest + 1)
        };

        let dest = self.version_dir(app_id, next);
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || copy_dir(&source, &dest))
            .await
            .map_err(|e| ArchiveError::Join(e.to_string()))??;

        Ok(next)
    }
}

/// Highest numeric sub-directory name of `dir`, if any.
fn latest_sequence(dir: &Path) -> Result<Option<i64>, ArchiveError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ArchiveError::io(format!("failed to list {}", dir.display()), e)),
    };

    let mut latest = None;
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io(format!("failed to list {}", dir.display()), e))?;
        if let Some(seq) = entry.file_name().to_str().and_then(|n| n.parse::<i64>().ok()) {
            latest = latest.max(Some(seq));
        }
    }
    Ok(latest)
}

/// Recursively copy `from` into `to`, creating `to` if needed.
pub(crate) fn copy_dir(from: &Path, to: &Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(to)
        .map_err(|e| ArchiveError::io(format!("failed to create {}", to.display()), e))?;

    let entries = std::fs::read_dir(from)
        .map_err(|e| ArchiveError::io(format!("failed to read {}", from.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io(format!("failed to read {}", from.display()), e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| ArchiveError::io(format!("failed to stat {}", src.display()), e))?;

        if file_type.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            std::fs::copy(&src, &dst)
                .map_err(|e| ArchiveError::io(format!("failed to copy {}", src.display()), e))?;
        }
    }
    Ok(())
}
