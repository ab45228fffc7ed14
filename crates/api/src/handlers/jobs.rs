//! Handlers for the `/jobs` resource.
//!
//! Authentication is handled outside this service; `owner_id` is taken as
//! supplied by the caller.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use trace_core::payload::DataType;
use trace_core::status::JobStatus;
use trace_core::types::DbId;
use trace_db::models::job::JobListQuery;
use trace_worker::submit::NewSubmission;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub owner_id: DbId,
    pub sample_id: String,
    pub input_path: String,
    pub data_type: DataType,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub owner_id: Option<DbId>,
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Record a job and enqueue it. Returns 201 with the job and its task id
/// without waiting for the pipeline.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let submission = state
        .submitter
        .submit(
            input.owner_id,
            NewSubmission {
                sample_id: input.sample_id,
                input_path: input.input_path,
                data_type: input.data_type,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: submission })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs?owner_id=
///
/// List an owner's jobs, newest first. Supports optional `status`,
/// `limit`, and `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> AppResult<impl IntoResponse> {
    let owner_id = params
        .owner_id
        .ok_or_else(|| AppError::BadRequest("owner_id is required".into()))?;

    let query = JobListQuery {
        status: params.status,
        limit: params.limit,
        offset: params.offset,
    };
    let jobs = state.reporter.list_for_owner(owner_id, &query).await?;

    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.reporter.by_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Returns 204 on success, 409 if the job has not finished yet.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.reporter.delete_job(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
