use trace_core::error::CoreError;

/// Errors from the caller-facing services: submission and status queries.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A domain-level error (not found, validation, conflict).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No task with this id, or its result has already expired.
    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
