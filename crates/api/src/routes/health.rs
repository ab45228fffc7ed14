use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use trace_core::status::TaskStatus;
use trace_db::repositories::TaskRepo;
use trace_pipeline::snakemake::PIPELINE_VERSION;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    /// Version of the analysis pipeline jobs are run against.
    pub pipeline_version: &'static str,
    pub db_healthy: bool,
    /// Tasks waiting for a worker; absent when the store is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_tasks: Option<i64>,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = trace_db::health_check(&state.pool).await.is_ok();
    let queued_tasks = if db_healthy {
        TaskRepo::count_by_status(&state.pool, TaskStatus::Pending)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to count queued tasks"))
            .ok()
    } else {
        None
    };

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        pipeline_version: PIPELINE_VERSION,
        db_healthy,
        queued_tasks,
    })
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
