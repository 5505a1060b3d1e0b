//! Server configuration.

use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_bind_addr: String,

    /// Root for archived releases and check-cycle workspaces.
    pub data_dir: PathBuf,

    /// Root of the release catalog.
    pub catalog_dir: PathBuf,

    /// JSON file with the application records to serve.
    pub seed_file: Option<PathBuf>,

    /// Token required on `/api` routes. `None` disables the check.
    pub api_token: Option<String>,
}

impl Config {
    /// Default config rooted at `base` (`<base>/data`, `<base>/catalog`).
    pub fn for_dirs(base: &Path) -> Self {
        Self {
            data_dir: base.join("data"),
            catalog_dir: base.join("catalog"),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "127.0.0.1:8800".to_string(),
            data_dir: PathBuf::from("data"),
            catalog_dir: PathBuf::from("catalog"),
            seed_file: None,
            api_token: None,
        }
    }
}
