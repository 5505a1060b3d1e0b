//! Shipcheck Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Storage backends
//! - Runtime specifics
//!
//! All types here describe installed applications, their release cursors,
//! and the status of the update-download workflow.

pub mod application;
pub mod error;
pub mod ids;
pub mod status;
pub mod update;

// Re-export commonly used types
pub use application::Application;
pub use error::{CoreError, ResolveError};
pub use ids::AppId;
pub use status::{TaskState, TaskStatus, UPDATE_DOWNLOAD_TASK};
pub use update::{pending_after, Cursor, UpdateCheckResult, UpdateDescriptor};
