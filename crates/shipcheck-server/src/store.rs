//! Application record storage.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use shipcheck_core::{AppId, Application, CoreError};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Invalid application record: {0}")]
    Invalid(#[from] CoreError),

    #[error("Failed to read seed file '{path}': {source}")]
    SeedRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse seed file '{path}': {source}")]
    SeedParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Read/write access to application records.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_by_slug(&self, slug: &str) -> Result<Application, StoreError>;

    async fn get_by_id(&self, id: &AppId) -> Result<Application, StoreError>;

    /// Stamp the application's last update check with the current time.
    async fn set_last_updated_at(&self, id: &AppId) -> Result<(), StoreError>;

    /// Move the application to an already archived release sequence.
    async fn set_current_sequence(&self, id: &AppId, sequence: i64) -> Result<(), StoreError>;
}

/// Application store held in memory, optionally seeded from a JSON file.
#[derive(Default)]
pub struct InMemoryApplicationStore {
    apps: RwLock<HashMap<AppId, Application>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON array of application records.
    pub fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::SeedRead {
            path: shown.clone(),
            source,
        })?;
        let apps: Vec<Application> =
            serde_json::from_str(&raw).map_err(|source| StoreError::SeedParse {
                path: shown.clone(),
                source,
            })?;

        let mut map = HashMap::with_capacity(apps.len());
        for app in apps {
            app.validate()?;
            map.insert(app.id.clone(), app);
        }

        info!(path = %shown, applications = map.len(), "Loaded application seed");
        Ok(Self {
            apps: RwLock::new(map),
        })
    }

    /// Insert or replace an application record.
    pub async fn insert(&self, app: Application) -> Result<(), StoreError> {
        app.validate()?;
        self.apps.write().await.insert(app.id.clone(), app);
        Ok(())
    }

    /// Get the number of stored applications.
    pub async fn len(&self) -> usize {
        self.apps.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.apps.read().await.is_empty()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn get_by_slug(&self, slug: &str) -> Result<Application, StoreError> {
        let apps = self.apps.read().await;
        apps.values()
            .find(|a| a.slug == slug)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))
    }

    async fn get_by_id(&self, id: &AppId) -> Result<Application, StoreError> {
        let apps = self.apps.read().await;
        apps.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn set_last_updated_at(&self, id: &AppId) -> Result<(), StoreError> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        app.last_updated_at = Some(Utc::now());
        Ok(())
    }

    async fn set_current_sequence(&self, id: &AppId, sequence: i64) -> Result<(), StoreError> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        app.current_sequence = sequence;
        Ok(())
    }
}
