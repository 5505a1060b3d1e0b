//! Upstream release resolution and download.
//!
//! The bundled [`CatalogUpstream`] serves releases from a directory tree:
//!
//! ```text
//! <catalog>/<app_slug>/license.json
//! <catalog>/<app_slug>/channels/<channel>/<cursor>/...
//! <catalog>/<app_slug>/channels/<channel>/<cursor>/release.json   (optional)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use shipcheck_core::{pending_after, AppId, ResolveError, UpdateDescriptor};

use crate::archive::{copy_dir, ArchiveError, VersionArchive};
use crate::manifest::{self, Installation, License, LicenseReference, ManifestError};

/// Input for a pending-update lookup.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub license: LicenseReference,
    pub current_cursor: String,
    pub current_channel: String,
    /// Suppress progress logging.
    pub silent: bool,
}

/// Computes the releases published after the installed one.
#[async_trait]
pub trait UpdateResolver: Send + Sync {
    /// Pending releases, oldest first.
    async fn resolve_updates(&self, request: ResolveRequest) -> Result<Vec<UpdateDescriptor>, ResolveError>;
}

/// Per-release download errors. Never fatal to a batch.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Release {cursor} not found in channel {channel}")]
    ReleaseNotFound { cursor: String, channel: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Download failed: {0}")]
    Other(String),
}

/// Fetches one release into a workspace.
#[async_trait]
pub trait UpdateDownloader: Send + Sync {
    /// Apply the release at `cursor` on top of `workspace` and archive the result.
    async fn download_update(&self, app_id: &AppId, workspace: &Path, cursor: &str) -> Result<(), DownloadError>;
}

/// Optional per-release metadata file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseInfo {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    version_label: Option<String>,
    #[serde(default)]
    release_notes: Option<String>,
}

const RELEASE_INFO_FILE: &str = "release.json";
const USERDATA_DIR: &str = "userdata";

/// Path of the upstream copy of an application's license in a catalog.
pub fn catalog_license_path(root: &Path, app_slug: &str) -> PathBuf {
    root.join(app_slug).join("license.json")
}

/// Filesystem release catalog acting as both resolver and downloader.
pub struct CatalogUpstream {
    root: PathBuf,
    archive: Arc<dyn VersionArchive>,
}

impl CatalogUpstream {
    pub fn new(root: impl Into<PathBuf>, archive: Arc<dyn VersionArchive>) -> Self {
        Self {
            root: root.into(),
            archive,
        }
    }

    fn app_dir(&self, app_slug: &str) -> PathBuf {
        self.root.join(app_slug)
    }

    fn channel_dir(&self, app_slug: &str, channel: &str) -> PathBuf {
        self.app_dir(app_slug).join("channels").join(channel)
    }

    async fn read_release_info(dir: &Path) -> ReleaseInfo {
        let path = dir.join(RELEASE_INFO_FILE);
        match manifest::read_json::<ReleaseInfo>(&path).await {
            Ok(info) => info,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No usable release info");
                ReleaseInfo::default()
            }
        }
    }

    async fn list_releases(&self, app_slug: &str, channel: &str) -> Result<Vec<UpdateDescriptor>, ResolveError> {
        let dir = self.channel_dir(app_slug, channel);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResolveError::actionable(format!(
                    "Channel \"{channel}\" is not available for this license"
                )));
            }
            Err(e) => {
                return Err(ResolveError::internal(format!(
                    "failed to list releases in {}: {e}",
                    dir.display()
                )));
            }
        };

        let mut releases = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(ResolveError::internal(format!(
                        "failed to list releases in {}: {e}",
                        dir.display()
                    )));
                }
            };
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let Some(cursor) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_dir {
                continue;
            }

            let info = Self::read_release_info(&entry.path()).await;
            let mut descriptor = UpdateDescriptor::new(cursor, info.channel_id.unwrap_or_else(|| channel.to_string()));
            if let Some(label) = info.version_label {
                descriptor = descriptor.with_metadata("versionLabel", label);
            }
            if let Some(notes) = info.release_notes {
                descriptor = descriptor.with_metadata("releaseNotes", notes);
            }
            releases.push(descriptor);
        }
        Ok(releases)
    }
}

#[async_trait]
impl UpdateResolver for CatalogUpstream {
    async fn resolve_updates(&self, request: ResolveRequest) -> Result<Vec<UpdateDescriptor>, ResolveError> {
        let license = &request.license.license;
        if license.is_expired(Utc::now()) {
            return Err(ResolveError::actionable(format!(
                "License {} has expired. Contact your vendor to renew it.",
                license.license_id
            )));
        }

        if !tokio::fs::try_exists(self.app_dir(&license.app_slug)).await.unwrap_or(false) {
            return Err(ResolveError::internal(format!(
                "application {} is not present in catalog {}",
                license.app_slug,
                self.root.display()
            )));
        }

        let channel = if request.current_channel.is_empty() {
            license.channel_name.as_str()
        } else {
            request.current_channel.as_str()
        };

        let releases = self.list_releases(&license.app_slug, channel).await?;
        let pending = pending_after(&request.current_cursor, releases);

        if request.silent {
            debug!(app_slug = %license.app_slug, channel, pending = pending.len(), "Resolved pending updates");
        } else {
            info!(
                app_slug = %license.app_slug,
                channel,
                current_cursor = %request.current_cursor,
                pending = pending.len(),
                "Resolved pending updates"
            );
        }
        Ok(pending)
    }
}

#[async_trait]
impl UpdateDownloader for CatalogUpstream {
    async fn download_update(&self, app_id: &AppId, workspace: &Path, cursor: &str) -> Result<(), DownloadError> {
        let installation_path = manifest::installation_path(workspace);
        let mut installation: Installation = manifest::read_json(&installation_path).await?;
        let license: License = manifest::read_json(&manifest::license_path(workspace)).await?;

        let channel = if installation.channel_name.is_empty() {
            license.channel_name.clone()
        } else {
            installation.channel_name.clone()
        };

        let release_dir = self.channel_dir(&license.app_slug, &channel).join(cursor);
        if !tokio::fs::try_exists(&release_dir).await.unwrap_or(false) {
            return Err(DownloadError::ReleaseNotFound {
                cursor: cursor.to_string(),
                channel,
            });
        }

        let info = Self::read_release_info(&release_dir).await;
        let upstream_dir = workspace.join("upstream");
        let from = release_dir.clone();
        tokio::task::spawn_blocking(move || apply_release(&from, &upstream_dir))
            .await
            .map_err(|e| DownloadError::Other(e.to_string()))??;

        installation.update_cursor = cursor.to_string();
        installation.channel_name = channel;
        installation.channel_id = info.channel_id;
        installation.version_label = info.version_label;
        installation.release_notes = info.release_notes;
        manifest::write_json(&installation_path, &installation).await?;

        let sequence = self.archive.store_version(app_id, workspace).await?;
        info!(app_id = %app_id, cursor, sequence, "Downloaded release");
        Ok(())
    }
}

/// Replace the release files under `upstream` with those of `release`.
///
/// `upstream/userdata` survives; the catalog's release metadata is not copied.
fn apply_release(release: &Path, upstream: &Path) -> Result<(), ArchiveError> {
    match std::fs::read_dir(upstream) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry.map_err(|e| ArchiveError::io(format!("failed to read {}", upstream.display()), e))?;
                if entry.file_name() == USERDATA_DIR {
                    continue;
                }
                let path = entry.path();
                let removed = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                removed.map_err(|e| ArchiveError::io(format!("failed to remove {}", path.display()), e))?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ArchiveError::io(format!("failed to read {}", upstream.display()), e)),
    }

    std::fs::create_dir_all(upstream)
        .map_err(|e| ArchiveError::io(format!("failed to create {}", upstream.display()), e))?;
    let entries = std::fs::read_dir(release)
        .map_err(|e| ArchiveError::io(format!("failed to read {}", release.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io(format!("failed to read {}", release.display()), e))?;
        let name = entry.file_name();
        if name == RELEASE_INFO_FILE {
            continue;
        }
        let src = entry.path();
        let dst = upstream.join(&name);
        if src.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            std::fs::copy(&src, &dst)
                .map_err(|e| ArchiveError::io(format!("failed to copy {}", src.display()), e))?;
        }
    }
    Ok(())
}
