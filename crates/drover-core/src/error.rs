//! Unified error type shared across the workspace.

use std::fmt::Debug;
use thiserror::Error;

/// Workspace-wide error type for configuration and process setup.
///
/// Job handling has its own richer enum in `drover-jobs`.
#[derive(Error, Debug)]
pub enum DroverError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DroverError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

/// Result alias using [`DroverError`].
pub type DroverResult<T> = Result<T, DroverError>;
