//! License synchronization.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use shipcheck_core::Application;

use crate::archive::{ArchiveError, VersionArchive};
use crate::manifest::{self, License, ManifestError};
use crate::store::{ApplicationStore, StoreError};
use crate::upstream::catalog_license_path;

/// License sync errors.
#[derive(Debug, Error)]
pub enum LicenseSyncError {
    #[error("Upstream license unavailable for {app_slug}: {source}")]
    Upstream {
        app_slug: String,
        #[source]
        source: ManifestError,
    },

    #[error("Upstream license belongs to {found}, expected {expected}")]
    Mismatch { expected: String, found: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Keeps an application's license in line with its source of truth.
#[async_trait]
pub trait LicenseReconciler: Send + Sync {
    /// Returns true when a changed license produced a new release sequence.
    async fn sync_license(
        &self,
        app: &Application,
        channel_override: Option<&str>,
    ) -> Result<bool, LicenseSyncError>;
}

/// Syncs licenses from the release catalog.
///
/// A newer `licenseSequence` upstream (or a channel override) is written
/// into a copy of the current release, archived as a new sequence, and made
/// current on the application record.
pub struct CatalogLicenseSync {
    catalog: PathBuf,
    archive: Arc<dyn VersionArchive>,
    store: Arc<dyn ApplicationStore>,
}

impl CatalogLicenseSync {
    pub fn new(
        catalog: impl Into<PathBuf>,
        archive: Arc<dyn VersionArchive>,
        store: Arc<dyn ApplicationStore>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            archive,
            store,
        }
    }
}

#[async_trait]
impl LicenseReconciler for CatalogLicenseSync {
    async fn sync_license(
        &self,
        app: &Application,
        channel_override: Option<&str>,
    ) -> Result<bool, LicenseSyncError> {
        let workspace = self.archive.workspace(&app.id, app.current_sequence).await?;
        let license_path = manifest::license_path(workspace.path());
        let installed: License = manifest::read_json(&license_path).await?;

        let upstream_path = catalog_license_path(&self.catalog, &installed.app_slug);
        let mut latest: License = manifest::read_json(&upstream_path)
            .await
            .map_err(|source| LicenseSyncError::Upstream {
                app_slug: installed.app_slug.clone(),
                source,
            })?;

        if latest.app_slug != installed.app_slug {
            return Err(LicenseSyncError::Mismatch {
                expected: installed.app_slug,
                found: latest.app_slug,
            });
        }

        if let Some(channel) = channel_override {
            latest.channel_name = channel.to_string();
        }

        if latest.license_sequence == installed.license_sequence
            && latest.channel_name == installed.channel_name
        {
            debug!(app_slug = %app.slug, license_sequence = installed.license_sequence, "License unchanged");
            if let Err(e) = workspace.release().await {
                warn!(app_slug = %app.slug, error = %e, "Failed to release license workspace");
            }
            return Ok(false);
        }

        manifest::write_json(&license_path, &latest).await?;
        let sequence = self.archive.store_version(&app.id, workspace.path()).await?;
        self.store.set_current_sequence(&app.id, sequence).await?;

        info!(
            app_slug = %app.slug,
            from = installed.license_sequence,
            to = latest.license_sequence,
            sequence,
            "License updated"
        );

        if let Err(e) = workspace.release().await {
            warn!(app_slug = %app.slug, error = %e, "Failed to release license workspace");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FsVersionArchive;
    use crate::manifest::Installation;
    use crate::store::InMemoryApplicationStore;
    use shipcheck_core::AppId;

    fn license(sequence: i64) -> License {
        License {
            license_id: "lic-1".into(),
            app_slug: "sentry".into(),
            channel_name: "stable".into(),
            license_sequence: sequence,
            expires_at: None,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        sync: CatalogLicenseSync,
        archive: Arc<FsVersionArchive>,
        store: Arc<InMemoryApplicationStore>,
        app: Application,
    }

    async fn fixture(installed: i64, upstream: i64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("catalog");
        let archive = Arc::new(FsVersionArchive::new(dir.path().join("data")));
        let store = Arc::new(InMemoryApplicationStore::new());

        let release = dir.path().join("release");
        manifest::write_json(&manifest::installation_path(&release), &Installation::default())
            .await
            .unwrap();
        manifest::write_json(&manifest::license_path(&release), &license(installed))
            .await
            .unwrap();
        manifest::write_json(&catalog_license_path(&catalog, "sentry"), &license(upstream))
            .await
            .unwrap();

        let app_id = AppId::new("app-1");
        let sequence = archive.store_version(&app_id, &release).await.unwrap();
        let app = Application::new("sentry").with_id(app_id).with_sequence(sequence);
        store.insert(app.clone()).await.unwrap();

        let sync = CatalogLicenseSync::new(catalog, archive.clone(), store.clone());
        Fixture {
            _dir: dir,
            sync,
            archive,
            store,
            app,
        }
    }

    #[tokio::test]
    async fn test_unchanged_license_is_noop() {
        let fx = fixture(1, 1).await;
        assert!(!fx.sync.sync_license(&fx.app, None).await.unwrap());
        assert_eq!(fx.store.get_by_id(&fx.app.id).await.unwrap().current_sequence, 0);
    }

    #[tokio::test]
    async fn test_newer_license_creates_release() {
        let fx = fixture(1, 2).await;
        assert!(fx.sync.sync_license(&fx.app, None).await.unwrap());

        let app = fx.store.get_by_id(&fx.app.id).await.unwrap();
        assert_eq!(app.current_sequence, 1);

        let workspace = fx.archive.workspace(&app.id, 1).await.unwrap();
        let stored: License = manifest::read_json(&manifest::license_path(workspace.path()))
            .await
            .unwrap();
        assert_eq!(stored.license_sequence, 2);
    }

    #[tokio::test]
    async fn test_missing_upstream_license() {
        let fx = fixture(1, 1).await;
        let mut app = fx.app.clone();
        app.current_sequence = 0;
        std::fs::remove_file(catalog_license_path(&fx.sync.catalog, "sentry")).unwrap();

        let result = fx.sync.sync_license(&app, None).await;
        assert!(matches!(result, Err(LicenseSyncError::Upstream { .. })));
    }
}
