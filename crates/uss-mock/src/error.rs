//! Error types for the mock USS.

use thiserror::Error;

use crate::registry::RegistryError;

/// Result type for mock USS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mock USS operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Shared state error
    #[error("State store error: {0}")]
    Store(#[from] uss_state::StoreError),

    /// Task scheduling error
    #[error("Task error: {0}")]
    Task(#[from] uss_tasks::TaskError),

    /// Registry or peer USS error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A polling wait ran past its deadline
    #[error("Deadlock: {0}")]
    Deadlock(String),

    /// Some flights could not be withdrawn
    #[error("Flight cleanup failed: {0}")]
    Cleanup(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
