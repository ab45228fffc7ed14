use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trace_pipeline::SnakemakeRunner;
use trace_worker::config::WorkerConfig;
use trace_worker::queue::TaskQueue;
use trace_worker::retention;
use trace_worker::worker::{run_pool, Worker, WorkerSettings};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(
        concurrency = config.concurrency,
        pipeline_dir = %config.pipeline.pipeline_dir.display(),
        scratch_dir = %config.scratch_dir.display(),
        lease_secs = config.queue.lease.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = trace_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    trace_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    trace_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .expect("Failed to create scratch directory");

    // --- Worker ---
    let queue = TaskQueue::new(pool.clone(), config.queue);
    let worker = Arc::new(Worker::new(
        queue,
        SnakemakeRunner::new(config.pipeline.clone()),
        WorkerSettings {
            scratch_dir: config.scratch_dir.clone(),
            pipeline_timeout: config.pipeline_timeout,
        },
    ));

    let cancel = CancellationToken::new();

    let retention_handle = tokio::spawn(retention::run(
        pool.clone(),
        config.result_retention,
        cancel.clone(),
    ));
    let pool_handle = tokio::spawn(run_pool(worker, config.concurrency, cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();

    // In-flight pipeline processes are killed; their tasks are redelivered
    // after the lease expires.
    if let Err(e) = pool_handle.await {
        tracing::error!(error = %e, "Worker pool task failed");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trace_worker=debug,trace_pipeline=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), stopping worker");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping worker");
        }
    }
}
