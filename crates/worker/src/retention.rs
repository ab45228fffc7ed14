//! Periodic expiry of finished task results.
//!
//! Finished rows in `tasks` double as the result backend. This loop deletes
//! those older than the retention window on a fixed interval; the jobs
//! themselves are never touched.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use trace_db::repositories::TaskRepo;
use trace_db::DbPool;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Delete finished task rows older than `retention`. Returns the count.
pub async fn purge_once(pool: &DbPool, retention: Duration) -> Result<u64, sqlx::Error> {
    let window = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    TaskRepo::purge_finished_before(pool, cutoff).await
}

/// Run the task result retention loop until `cancel` is triggered.
pub async fn run(pool: DbPool, retention: Duration, cancel: CancellationToken) {
    tracing::info!(
        retention_hours = retention.as_secs() / 3600,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Task retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task retention job stopping");
                break;
            }
            _ = interval.tick() => {
                match purge_once(&pool, retention).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Task retention: purged expired results");
                        } else {
                            tracing::debug!("Task retention: no rows to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Task retention: cleanup failed");
                    }
                }
            }
        }
    }
}
