//! HTTP request handlers.

mod health;
mod updates;

pub use health::{health_check, metrics_handler};
pub use updates::{app_update_check, update_download_status};
