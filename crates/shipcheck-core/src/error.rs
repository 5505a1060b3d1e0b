//! Core domain errors.

use thiserror::Error;

/// Core domain errors for shipcheck.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cursor string that cannot identify a release.
    #[error("Invalid cursor: {0:?}")]
    InvalidCursor(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failure to compute the pending update set.
///
/// The variant is chosen where the error is raised: only `Actionable`
/// messages are written for an end user and may be shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The user can fix this (expired license, unknown channel, ...).
    #[error("{0}")]
    Actionable(String),

    /// Diagnostic-only failure (I/O, bad catalog data, transport).
    #[error("{0}")]
    Internal(String),
}

impl ResolveError {
    pub fn actionable(message: impl Into<String>) -> Self {
        Self::Actionable(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Actionable(_))
    }

    /// The message carried by either variant.
    pub fn message(&self) -> &str {
        match self {
            Self::Actionable(message) | Self::Internal(message) => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_display_is_bare_message() {
        assert_eq!(
            ResolveError::actionable("license expired").to_string(),
            "license expired"
        );
        assert_eq!(
            ResolveError::internal("network timeout").to_string(),
            "network timeout"
        );
    }

    #[test]
    fn test_classification() {
        assert!(ResolveError::actionable("x").is_actionable());
        assert!(!ResolveError::internal("x").is_actionable());
    }
}
