//! Update check handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use shipcheck_core::{TaskStatus, UpdateCheckResult, UPDATE_DOWNLOAD_TASK};

use crate::error::UpdateError;
use crate::state::AppState;

/// Check an application for updates.
///
/// Responds once the pending count is known; downloads continue in the
/// background.
pub async fn app_update_check(
    State(state): State<Arc<AppState>>,
    Path(app_slug): Path<String>,
) -> Result<Json<UpdateCheckResult>, UpdateError> {
    let result = state.orchestrator.check_for_updates(&app_slug).await?;
    Ok(Json(result))
}

/// Current status of the update-download task.
pub async fn update_download_status(
    State(state): State<Arc<AppState>>,
    Path(app_slug): Path<String>,
) -> Result<Json<TaskStatus>, UpdateError> {
    // the task is process-wide, but the slug must still resolve
    state
        .apps
        .get_by_slug(&app_slug)
        .await
        .map_err(UpdateError::from_lookup)?;
    let status = state.task_status.get(UPDATE_DOWNLOAD_TASK).await?;
    Ok(Json(status))
}
