//! HTTP server.
//!
//! Provides endpoints for:
//! - Update check (`POST /api/v1/app/:app_slug/updatecheck`)
//! - Update download status (`GET /api/v1/app/:app_slug/task/updatedownload`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod auth;
mod handlers;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // Browser admin consoles call the API cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(
            "/api/v1/app/:app_slug/updatecheck",
            post(handlers::app_update_check),
        )
        .route(
            "/api/v1/app/:app_slug/task/updatedownload",
            get(handlers::update_download_status),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .merge(api)
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use reqwest::StatusCode;
    use shipcheck_core::{AppId, Application, TaskState, UPDATE_DOWNLOAD_TASK};
    use tokio::net::TcpListener;

    use crate::config::Config;
    use crate::manifest::{self, Installation, License};
    use crate::upstream::catalog_license_path;

    struct Server {
        _dir: tempfile::TempDir,
        base: String,
        state: Arc<AppState>,
    }

    /// Serve a catalog with releases 5..=7 for `sentry`, installed at 5.
    async fn serve(api_token: Option<&str>) -> Server {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_dirs(dir.path());
        config.api_token = api_token.map(str::to_string);

        let license = License {
            license_id: "lic-1".into(),
            app_slug: "sentry".into(),
            channel_name: "stable".into(),
            license_sequence: 1,
            expires_at: None,
        };

        // Installed release, archived as sequence 0
        let app_id = AppId::new("id-1");
        let installed = config.data_dir.join("archives").join(app_id.as_str()).join("0");
        manifest::write_json(
            &manifest::installation_path(&installed),
            &Installation {
                update_cursor: "5".into(),
                channel_name: "stable".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        manifest::write_json(&manifest::license_path(&installed), &license)
            .await
            .unwrap();

        manifest::write_json(&catalog_license_path(&config.catalog_dir, "sentry"), &license)
            .await
            .unwrap();
        for cursor in ["5", "6", "7"] {
            let release = config.catalog_dir.join("sentry/channels/stable").join(cursor);
            std::fs::create_dir_all(&release).unwrap();
            std::fs::write(release.join("app.yaml"), cursor).unwrap();
        }

        let seed = dir.path().join("apps.json");
        let apps = vec![Application::new("sentry").with_id(app_id).with_release("5", "stable")];
        std::fs::write(&seed, serde_json::to_vec(&apps).unwrap()).unwrap();
        config.seed_file = Some(seed);

        let state = AppState::from_config(&config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let router = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Server {
            _dir: dir,
            base,
            state,
        }
    }

    async fn wait_until_settled(state: &Arc<AppState>) -> TaskState {
        for _ in 0..200 {
            let current = state.task_status.get(UPDATE_DOWNLOAD_TASK).await.unwrap().state;
            if current.is_terminal() {
                return current;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("update download never finished");
    }

    #[tokio::test]
    async fn test_update_check_reports_and_downloads() {
        let server = serve(None).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/v1/app/sentry/updatecheck", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["availableUpdates"], 2);

        assert_eq!(wait_until_settled(&server.state).await, TaskState::Done);

        let resp = client
            .get(format!("{}/api/v1/app/sentry/task/updatedownload", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let status: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(status["state"], "done");
    }

    #[tokio::test]
    async fn test_unknown_app_is_server_error() {
        let server = serve(None).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/v1/app/missing/updatecheck", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.text().await.unwrap(), "Application not found: missing");
    }

    #[tokio::test]
    async fn test_token_required_when_configured() {
        let server = serve(Some("s3cret")).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/app/sentry/task/updatedownload", server.base);

        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = client
            .get(&url)
            .header("Authorization", "Bearer s3cret")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Observability routes stay open
        let resp = client
            .get(format!("{}/health", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let server = serve(None).await;
        let body = reqwest::get(format!("{}/metrics", server.base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("shipcheck_update_checks_total 0"));
    }
}
