//! Release manifests read from an archive workspace.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Manifest errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write manifest '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Installation state of the release in a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    /// Cursor of the installed release.
    #[serde(default)]
    pub update_cursor: String,

    /// Channel the release came from.
    #[serde(default)]
    pub channel_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

/// License shipped with the release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub license_id: String,

    /// Upstream application the license grants access to.
    pub app_slug: String,

    #[serde(default)]
    pub channel_name: String,

    /// Revision counter bumped upstream whenever the license changes.
    #[serde(default)]
    pub license_sequence: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl License {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Where a release's license lives, plus its parsed contents.
#[derive(Debug, Clone, PartialEq)]
pub struct LicenseReference {
    pub path: PathBuf,
    pub license: License,
}

/// Manifests needed to check a release for updates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseManifests {
    pub installation: Installation,
    pub license: LicenseReference,
}

impl ReleaseManifests {
    pub fn current_cursor(&self) -> &str {
        &self.installation.update_cursor
    }

    pub fn current_channel(&self) -> &str {
        &self.installation.channel_name
    }
}

pub fn installation_path(root: &Path) -> PathBuf {
    root.join("upstream").join("userdata").join("installation.json")
}

pub fn license_path(root: &Path) -> PathBuf {
    root.join("upstream").join("userdata").join("license.json")
}

/// Load installation and license manifests from a workspace root.
pub async fn load_manifests(root: &Path) -> Result<ReleaseManifests, ManifestError> {
    let installation: Installation = read_json(&installation_path(root)).await?;
    let path = license_path(root);
    let license: License = read_json(&path).await?;

    Ok(ReleaseManifests {
        installation,
        license: LicenseReference { path, license },
    })
}

/// Read and parse one JSON manifest.
pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let display = path.display().to_string();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: display.clone(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
        path: display,
        source,
    })
}

/// Serialize `value` as pretty JSON into `path`, creating parent directories.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ManifestError> {
    let display = path.display().to_string();
    let io_err = |source| ManifestError::Write {
        path: display.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let body = serde_json::to_vec_pretty(value).map_err(|source| ManifestError::Parse {
        path: display.clone(),
        source,
    })?;
    tokio::fs::write(path, body).await.map_err(io_err)
}
