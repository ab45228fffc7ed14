#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tower::ServiceExt;

use trace_api::config::ServerConfig;
use trace_api::router::build_app_router;
use trace_api::state::AppState;
use trace_worker::config::QueueConfig;
use trace_worker::queue::TaskQueue;
use trace_worker::status::StatusReporter;
use trace_worker::submit::Submitter;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Build the full application router over `pool`, with the same middleware
/// stack production uses.
pub fn build_test_app(pool: SqlitePool) -> Router {
    let config = test_config();
    let queue = TaskQueue::new(pool.clone(), QueueConfig::default());
    let state = AppState {
        pool,
        submitter: Submitter::new(queue.clone()),
        reporter: StatusReporter::new(queue),
    };
    build_app_router(state, &config)
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Submit a job through the API and return the `data` object.
pub async fn submit_job(app: Router, owner_id: i64, sample_id: &str) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/jobs",
        serde_json::json!({
            "owner_id": owner_id,
            "sample_id": sample_id,
            "input_path": format!("/data/uploads/{sample_id}.bam"),
            "data_type": "WGS",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}
