//! Integration tests for the `/api/v1/jobs` and `/api/v1/tasks` endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, delete, get, post_json, submit_job};
use sqlx::SqlitePool;
use trace_core::status::JobStatus;
use trace_db::repositories::JobRepo;
use trace_worker::config::QueueConfig;
use trace_worker::queue::TaskQueue;

/// Drive a job to `complete` the way a worker would.
async fn complete(pool: &SqlitePool, job_id: i64, task_id: &str) {
    JobRepo::set_status(pool, job_id, JobStatus::Running, "Snakemake pipeline has started.")
        .await
        .unwrap();
    JobRepo::set_status(
        pool,
        job_id,
        JobStatus::Complete,
        "Pipeline finished successfully. Results at: /out/X1.tsv",
    )
    .await
    .unwrap();
    TaskQueue::new(pool.clone(), QueueConfig::default())
        .ack(
            task_id,
            &serde_json::json!({"status": "Success", "output": "/out/X1.tsv"}),
        )
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn submit_returns_created_job_and_task_id(pool: SqlitePool) {
    let data = submit_job(build_test_app(pool), 3, "X1").await;

    assert_eq!(data["job"]["status"], "pending");
    assert_eq!(data["job"]["owner_id"], 3);
    assert!(data["job"]["result"].is_null());
    assert!(data["job"]["created_at"].is_string());
    assert!(data["task_id"].is_string());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn submit_rejects_unsafe_sample_id(pool: SqlitePool) {
    let response = post_json(
        build_test_app(pool),
        "/api/v1/jobs",
        serde_json::json!({
            "owner_id": 1,
            "sample_id": "../../etc",
            "input_path": "/in/x.bam",
            "data_type": "WGS",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn submit_rejects_unknown_data_type(pool: SqlitePool) {
    let response = post_json(
        build_test_app(pool),
        "/api/v1/jobs",
        serde_json::json!({
            "owner_id": 1,
            "sample_id": "X1",
            "input_path": "/in/x.bam",
            "data_type": "RNA",
        }),
    )
    .await;

    assert!(response.status().is_client_error());
}

// ---------------------------------------------------------------------------
// Get / list
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn get_job_returns_external_view(pool: SqlitePool) {
    let data = submit_job(build_test_app(pool.clone()), 1, "X1").await;
    let id = data["job"]["id"].as_i64().unwrap();

    let response = get(build_test_app(pool), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let job = body_json(response).await["data"].clone();
    let mut keys: Vec<_> = job.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["created_at", "id", "owner_id", "result", "status"]);
    assert_eq!(job["id"], id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn get_missing_job_returns_404(pool: SqlitePool) {
    let response = get(build_test_app(pool), "/api/v1/jobs/4242").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Job with id 4242 not found");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_requires_owner_id(pool: SqlitePool) {
    let response = get(build_test_app(pool), "/api/v1/jobs").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_filters_by_owner_and_status(pool: SqlitePool) {
    let first = submit_job(build_test_app(pool.clone()), 1, "A1").await;
    submit_job(build_test_app(pool.clone()), 1, "A2").await;
    submit_job(build_test_app(pool.clone()), 2, "B1").await;

    let response = get(build_test_app(pool.clone()), "/api/v1/jobs?owner_id=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let jobs = body_json(response).await["data"].clone();
    assert_eq!(jobs.as_array().unwrap().len(), 2);

    let id = first["job"]["id"].as_i64().unwrap();
    let task_id = first["task_id"].as_str().unwrap();
    complete(&pool, id, task_id).await;

    let response = get(
        build_test_app(pool),
        "/api/v1/jobs?owner_id=1&status=complete",
    )
    .await;
    let jobs = body_json(response).await["data"].clone();
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], id);
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_unfinished_job_returns_409(pool: SqlitePool) {
    let data = submit_job(build_test_app(pool.clone()), 1, "X1").await;
    let id = data["job"]["id"].as_i64().unwrap();

    let response = delete(build_test_app(pool.clone()), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = get(build_test_app(pool), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_finished_job_removes_it(pool: SqlitePool) {
    let data = submit_job(build_test_app(pool.clone()), 1, "X1").await;
    let id = data["job"]["id"].as_i64().unwrap();
    complete(&pool, id, data["task_id"].as_str().unwrap()).await;

    let response = delete(build_test_app(pool.clone()), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(build_test_app(pool.clone()), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = delete(build_test_app(pool), &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn task_view_tracks_queue_status(pool: SqlitePool) {
    let data = submit_job(build_test_app(pool.clone()), 1, "X1").await;
    let id = data["job"]["id"].as_i64().unwrap();
    let task_id = data["task_id"].as_str().unwrap().to_string();

    let response = get(build_test_app(pool.clone()), &format!("/api/v1/tasks/{task_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await["data"].clone();
    assert_eq!(view["task_id"], task_id.as_str());
    assert_eq!(view["status"], "PENDING");
    assert!(view["result"].is_null());

    complete(&pool, id, &task_id).await;

    let response = get(build_test_app(pool), &format!("/api/v1/tasks/{task_id}")).await;
    let view = body_json(response).await["data"].clone();
    assert_eq!(view["status"], "SUCCESS");
    assert_eq!(view["result"]["output"], "/out/X1.tsv");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_task_returns_404(pool: SqlitePool) {
    let response = get(build_test_app(pool), "/api/v1/tasks/not-a-task").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}
