//! Update check errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use shipcheck_core::ResolveError;

use crate::archive::ArchiveError;
use crate::license::LicenseSyncError;
use crate::manifest::ManifestError;
use crate::store::StoreError;

/// Failure of the synchronous part of an update check.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to sync license: {0}")]
    LicenseSync(#[from] LicenseSyncError),

    #[error("Failed to get app version archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to load release manifests: {0}")]
    ManifestParse(#[from] ManifestError),

    #[error("{0}")]
    Resolution(#[from] ResolveError),

    #[error("Update check aborted: {0}")]
    Aborted(String),
}

impl UpdateError {
    /// Classify a failed slug lookup, the only step that reports `NotFound`.
    pub fn from_lookup(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(slug) => Self::NotFound(slug),
            other => Self::Store(other),
        }
    }

    /// Body returned to the caller.
    ///
    /// Resolution failures carry their message unchanged, so an actionable
    /// message reaches the end user verbatim.
    pub fn response_body(&self) -> String {
        match self {
            Self::Resolution(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for UpdateError {
    fn into_response(self) -> Response {
        // Every failure is a generic server error; the body tells them apart
        match &self {
            UpdateError::NotFound(slug) => warn!(app_slug = %slug, "Application not found"),
            UpdateError::Resolution(e) => {
                error!(actionable = e.is_actionable(), error = %e, "Failed to resolve updates")
            }
            other => error!(error = %other, "Update check failed"),
        }
        (StatusCode::INTERNAL_SERVER_ERROR, self.response_body()).into_response()
    }
}
