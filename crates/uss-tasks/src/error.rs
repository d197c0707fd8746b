//! Error types for task scheduling.

use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors raised by the scheduler itself (not by task bodies).
#[derive(Debug, Error)]
pub enum TaskError {
    /// Shared state could not be read or committed.
    #[error("task state error: {0}")]
    Store(#[from] uss_state::StoreError),

    /// A task name was registered twice.
    #[error("task '{0}' registered more than once")]
    DuplicateTask(String),

    /// No periodic task with this name was declared.
    #[error("unknown periodic task '{0}'")]
    UnknownTask(String),

    /// A startup task failed; the service must not start.
    #[error("startup task '{task}' failed: {message}")]
    StartupFailed { task: String, message: String },
}
