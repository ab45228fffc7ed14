//! Integration tests for submission, the queue boundary, and status queries.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{queue, submit, succeed, worker, StubRunner};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use trace_core::error::CoreError;
use trace_core::payload::DataType;
use trace_core::status::{JobStatus, TaskStatus};
use trace_db::models::job::JobListQuery;
use trace_db::repositories::TaskRepo;
use trace_worker::error::ServiceError;
use trace_worker::queue::QueueError;
use trace_worker::retention;
use trace_worker::status::StatusReporter;
use trace_worker::submit::{NewSubmission, Submitter};

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn submit_records_pending_job_and_task(pool: SqlitePool) {
    let queue = queue(&pool);
    let submission = submit(&queue, 7, "X1").await;

    assert_eq!(submission.job.status, JobStatus::Pending);
    assert_eq!(submission.job.owner_id, 7);
    assert!(submission.job.result.is_none());
    assert_ne!(submission.task_id, submission.job.id.to_string());

    let task = queue.query(&submission.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.result.is_null());

    let delivery = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(delivery.payload.job_id, submission.job.id);
    assert_eq!(delivery.payload.sample_id, "X1");
    assert_eq!(delivery.payload.input_path, "/data/uploads/X1.bam");
    assert_eq!(delivery.payload.data_type, DataType::Wgs);
    assert_eq!(delivery.attempt, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn submit_rejects_unsafe_sample_id(pool: SqlitePool) {
    let submitter = Submitter::new(queue(&pool));
    let result = submitter
        .submit(
            1,
            NewSubmission {
                sample_id: "../etc/passwd".to_string(),
                input_path: "/in/X1.bam".to_string(),
                data_type: DataType::Wgbs,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::Core(CoreError::Validation(_))));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ---------------------------------------------------------------------------
// Queue boundary
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn malformed_payload_is_rejected_at_dequeue(pool: SqlitePool) {
    let queue = queue(&pool);
    let task = TaskRepo::enqueue(&pool, 1, r#"{"job_id":"one","sample_id":"X1"}"#)
        .await
        .unwrap();

    let err = queue.dequeue().await.unwrap_err();
    assert_matches!(err, QueueError::MalformedPayload { ref task_id, .. } if *task_id == task.task_id);

    let view = queue.query(&task.task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Failure);
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unsupported_payload_version_is_rejected(pool: SqlitePool) {
    let queue = queue(&pool);
    let raw = r#"{"version":2,"job_id":1,"input_path":"/in/X1.bam","sample_id":"X1","data_type":"WGS"}"#;
    TaskRepo::enqueue(&pool, 1, raw).await.unwrap();

    assert_matches!(
        queue.dequeue().await,
        Err(QueueError::MalformedPayload { .. })
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn next_delivery_returns_none_when_cancelled(pool: SqlitePool) {
    let queue = queue(&pool);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let delivery = tokio::time::timeout(Duration::from_secs(5), queue.next_delivery(&cancel))
        .await
        .expect("poll loop ignored cancellation")
        .unwrap();
    assert!(delivery.is_none());
}

// ---------------------------------------------------------------------------
// Status reporting
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn job_and_task_views_agree_on_terminality(pool: SqlitePool) {
    let scratch = tempfile::tempdir().unwrap();
    let queue = queue(&pool);
    let reporter = StatusReporter::new(queue.clone());
    let worker = worker(
        queue.clone(),
        StubRunner::new(pool.clone(), succeed()),
        scratch.path(),
    );

    let submission = submit(&queue, 1, "X1").await;
    let job = reporter.by_job(submission.job.id).await.unwrap();
    let task = reporter.by_task(&submission.task_id).await.unwrap();
    assert!(!job.status.is_terminal());
    assert!(!task.status.is_terminal());

    let delivery = queue.dequeue().await.unwrap().unwrap();
    worker
        .process(&delivery, &CancellationToken::new())
        .await
        .unwrap();

    let job = reporter.by_job(submission.job.id).await.unwrap();
    let task = reporter.by_task(&submission.task_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(TaskStatus::for_job(job.status), Some(task.status));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_ids_are_not_found(pool: SqlitePool) {
    let reporter = StatusReporter::new(queue(&pool));

    assert_matches!(
        reporter.by_job(42).await,
        Err(ServiceError::Core(CoreError::NotFound { entity: "Job", id: 42 }))
    );
    assert_matches!(
        reporter.by_task("no-such-task").await,
        Err(ServiceError::TaskNotFound(id)) if id == "no-such-task"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_for_owner_returns_only_their_jobs(pool: SqlitePool) {
    let queue = queue(&pool);
    let reporter = StatusReporter::new(queue.clone());
    submit(&queue, 1, "A1").await;
    submit(&queue, 2, "B1").await;
    let newest = submit(&queue, 1, "A2").await;

    let jobs = reporter
        .list_for_owner(1, &JobListQuery::default())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, newest.job.id);
    assert!(jobs.iter().all(|j| j.owner_id == 1));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deleting_terminal_job_removes_it(pool: SqlitePool) {
    let scratch = tempfile::tempdir().unwrap();
    let queue = queue(&pool);
    let reporter = StatusReporter::new(queue.clone());
    let worker = worker(
        queue.clone(),
        StubRunner::new(pool.clone(), succeed()),
        scratch.path(),
    );

    let submission = submit(&queue, 1, "X1").await;
    let delivery = queue.dequeue().await.unwrap().unwrap();
    worker
        .process(&delivery, &CancellationToken::new())
        .await
        .unwrap();

    reporter.delete_job(submission.job.id).await.unwrap();
    assert_matches!(
        reporter.by_job(submission.job.id).await,
        Err(ServiceError::Core(CoreError::NotFound { .. }))
    );
    assert_matches!(
        reporter.delete_job(submission.job.id).await,
        Err(ServiceError::Core(CoreError::NotFound { .. }))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deleting_unfinished_job_is_a_conflict(pool: SqlitePool) {
    let queue = queue(&pool);
    let reporter = StatusReporter::new(queue.clone());
    let submission = submit(&queue, 1, "X1").await;

    assert_matches!(
        reporter.delete_job(submission.job.id).await,
        Err(ServiceError::Core(CoreError::Conflict(_)))
    );
    assert!(reporter.by_job(submission.job.id).await.is_ok());
}

// ---------------------------------------------------------------------------
// Result retention
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn retention_purges_only_finished_tasks(pool: SqlitePool) {
    let queue = queue(&pool);
    let done = submit(&queue, 1, "X1").await;
    let waiting = submit(&queue, 1, "X2").await;
    queue.fail(&done.task_id, "boom").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(
        retention::purge_once(&pool, Duration::from_secs(3600)).await.unwrap(),
        0
    );
    assert_eq!(retention::purge_once(&pool, Duration::ZERO).await.unwrap(), 1);

    assert_matches!(
        queue.query(&done.task_id).await,
        Err(QueueError::TaskNotFound(_))
    );
    assert!(queue.query(&waiting.task_id).await.is_ok());
}
