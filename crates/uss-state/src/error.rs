//! Error types for the shared state store.

use thiserror::Error;

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or transacting on shared state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A transaction was opened by a thread that already holds one on the same store.
    #[error("transaction on '{0}' re-entered while already held by the same caller")]
    Reentrant(String),

    /// The committed value does not fit in the configured capacity.
    #[error("state '{name}' encodes to {size} bytes, exceeding capacity of {capacity} bytes")]
    CapacityExceeded {
        name: String,
        size: usize,
        capacity: usize,
    },

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The byte backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
