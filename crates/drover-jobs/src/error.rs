//! Job error types.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Store I/O or SQL error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Local I/O error (process spawning, stdin handling).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Enqueue input rejected before reaching the store.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid job state.
    #[error("Invalid job state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Runtime setting key is not recognised.
    #[error("Unknown configuration key: {0} (valid keys: max_retries, backoff_base)")]
    UnknownSetting(String),

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true for mistakes made by the operator.
    ///
    /// These are reported as diagnostics and leave the store untouched.
    pub fn is_operator_error(&self) -> bool {
        matches!(
            self,
            JobError::InvalidJob(_)
                | JobError::NotFound(_)
                | JobError::InvalidState { .. }
                | JobError::UnknownSetting(_)
        )
    }

    /// Returns true if the persistent store itself failed.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, JobError::Database(_))
    }
}
