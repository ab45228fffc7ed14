//! Handlers for the `/tasks` resource: the queue's own view of a task.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/tasks/{task_id}
///
/// Returns `{task_id, status, result}` where `status` is the queue's
/// vocabulary (`PENDING`, `STARTED`, `SUCCESS`, `FAILURE`).
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = state.reporter.by_task(&task_id).await?;
    Ok(Json(DataResponse { data: view }))
}
