//! Installed application records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppId, CoreError};

/// An installed application as seen by the update workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Unique application identifier.
    pub id: AppId,

    /// Human-readable key used in URLs.
    pub slug: String,

    /// Sequence number of the release currently installed.
    pub current_sequence: i64,

    /// Upstream cursor of the installed release.
    #[serde(default)]
    pub update_cursor: String,

    /// Channel the application is subscribed to.
    #[serde(default)]
    pub channel_name: String,

    /// When the last update check completed.
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Create a new Application at sequence 0.
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            id: AppId::generate(),
            slug: slug.into(),
            current_sequence: 0,
            update_cursor: String::new(),
            channel_name: String::new(),
            last_updated_at: None,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: AppId) -> Self {
        self.id = id;
        self
    }

    /// Builder method to set the installed sequence.
    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.current_sequence = sequence;
        self
    }

    /// Builder method to set cursor and channel.
    pub fn with_release(mut self, cursor: impl Into<String>, channel: impl Into<String>) -> Self {
        self.update_cursor = cursor.into();
        self.channel_name = channel.into();
        self
    }

    /// Check the fields a store needs to index this record.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.as_str().is_empty() {
            return Err(CoreError::InvalidInput("application id is empty".to_string()));
        }
        if self.slug.trim().is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "application {} has an empty slug",
                self.id
            )));
        }
        if self.current_sequence < 0 {
            return Err(CoreError::InvalidInput(format!(
                "application {} has negative sequence {}",
                self.slug, self.current_sequence
            )));
        }
        Ok(())
    }
}
