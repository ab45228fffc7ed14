use trace_worker::status::StatusReporter;
use trace_worker::submit::Submitter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the pool and both services are handles.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: trace_db::DbPool,
    /// Records jobs and enqueues their tasks.
    pub submitter: Submitter,
    /// Read-only job and task views.
    pub reporter: StatusReporter,
}
