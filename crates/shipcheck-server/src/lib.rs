//! Shipcheck server library.
//!
//! Update checks for installed applications: license sync, archive
//! workspaces, delta resolution against the release catalog, and the
//! background fetch loop that downloads pending releases.

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod license;
pub mod manifest;
pub mod metrics;
pub mod orchestrator;
pub mod state;
pub mod store;
pub mod task_status;
pub mod upstream;

pub use config::Config;
pub use error::UpdateError;
pub use orchestrator::UpdateOrchestrator;
pub use state::AppState;
