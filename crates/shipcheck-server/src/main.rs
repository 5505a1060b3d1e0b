//! Shipcheck server.
//!
//! Serves update checks over HTTP for the applications listed in the seed file.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shipcheck_server::{http, AppState, Config};

/// Shipcheck update-check and fetch server.
#[derive(Parser, Debug)]
#[command(name = "shipcheck-server", about = "Shipcheck update-check and fetch server")]
struct Args {
    /// HTTP server address
    #[arg(long, default_value = "127.0.0.1:8800")]
    http_addr: String,

    /// Directory for archived releases and workspaces
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Release catalog directory
    #[arg(long, default_value = "catalog")]
    catalog_dir: PathBuf,

    /// JSON file with application records
    #[arg(long)]
    seed_file: Option<PathBuf>,

    /// Token required on /api routes
    #[arg(long, env = "SHIPCHECK_API_TOKEN")]
    api_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shipcheck=info".parse()?))
        .with_target(true)
        .init();

    let config = Config {
        http_bind_addr: args.http_addr,
        data_dir: args.data_dir,
        catalog_dir: args.catalog_dir,
        seed_file: args.seed_file,
        api_token: args.api_token,
    };
    let http_addr: SocketAddr = config.http_bind_addr.parse()?;

    let state = AppState::from_config(&config)?;
    info!(
        data_dir = %config.data_dir.display(),
        catalog_dir = %config.catalog_dir.display(),
        auth = config.api_token.is_some(),
        "Starting Shipcheck server"
    );

    let router = http::create_router(state);
    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    axum::serve(listener, router).await?;

    Ok(())
}
