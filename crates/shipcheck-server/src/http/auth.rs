//! API token check for `/api` routes.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::state::AppState;

/// Reject requests without the configured token before any handler runs.
///
/// Accepts `Authorization: Bearer <token>` or the bare token.
pub async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim());

    if provided != Some(expected) {
        warn!(path = %request.uri().path(), "Rejected request without a valid token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(request).await
}
