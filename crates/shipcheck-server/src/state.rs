//! Shared application state.

use std::sync::Arc;

use crate::archive::{FsVersionArchive, VersionArchive};
use crate::config::Config;
use crate::license::CatalogLicenseSync;
use crate::metrics::Metrics;
use crate::orchestrator::{Collaborators, UpdateOrchestrator};
use crate::store::{ApplicationStore, InMemoryApplicationStore, StoreError};
use crate::task_status::{InMemoryTaskStatusStore, TaskStatusStore};
use crate::upstream::CatalogUpstream;

/// Shared application state.
pub struct AppState {
    /// Application records.
    pub apps: Arc<dyn ApplicationStore>,

    /// Process-wide task status, shared with the orchestrator.
    pub task_status: Arc<dyn TaskStatusStore>,

    /// Update check and fetch workflow.
    pub orchestrator: UpdateOrchestrator,

    /// Workflow counters.
    pub metrics: Arc<Metrics>,

    /// Token required on `/api` routes.
    pub api_token: Option<String>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(deps: Collaborators, api_token: Option<String>) -> Arc<Self> {
        let metrics = Metrics::new();
        Arc::new(Self {
            apps: deps.apps.clone(),
            task_status: deps.task_status.clone(),
            orchestrator: UpdateOrchestrator::new(deps, metrics.clone()),
            metrics,
            api_token,
        })
    }

    /// Wire the bundled local collaborators from `config`.
    pub fn from_config(config: &Config) -> Result<Arc<Self>, StoreError> {
        let apps: Arc<dyn ApplicationStore> = match &config.seed_file {
            Some(path) => Arc::new(InMemoryApplicationStore::from_seed_file(path)?),
            None => Arc::new(InMemoryApplicationStore::new()),
        };
        let archive: Arc<dyn VersionArchive> = Arc::new(FsVersionArchive::new(&config.data_dir));
        let upstream = Arc::new(CatalogUpstream::new(&config.catalog_dir, archive.clone()));
        let license = Arc::new(CatalogLicenseSync::new(
            &config.catalog_dir,
            archive.clone(),
            apps.clone(),
        ));

        let deps = Collaborators {
            apps,
            task_status: Arc::new(InMemoryTaskStatusStore::new()),
            license,
            archive,
            resolver: upstream.clone(),
            downloader: upstream,
        };
        Ok(Self::new(deps, config.api_token.clone()))
    }
}
