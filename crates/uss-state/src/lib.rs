//! USS Shared State
//!
//! A single value shared by every worker of the mock USS, readable at any
//! time as a consistent snapshot and mutable only inside an exclusive
//! transaction.
//!
//! # Design
//!
//! - **Publish on commit**: a transaction mutates a private decoded copy; the
//!   encoded bytes replace the published snapshot only on `commit()`.
//! - **Pluggable encoding**: [`Codec`] pairs (JSON, bincode) let one mechanism
//!   back different schemas.
//! - **Bounded size**: snapshots larger than the configured capacity are
//!   refused loudly instead of truncated.
//! - **Fail-fast re-entrance**: opening a second transaction on a store the
//!   calling thread already holds is an error, not a deadlock.
//!
//! # Example
//!
//! ```
//! use uss_state::SharedState;
//!
//! let state: SharedState<Vec<String>> = SharedState::in_memory("example").unwrap();
//! let mut tx = state.transact().unwrap();
//! tx.push("flight-1".to_string());
//! tx.commit().unwrap();
//! assert_eq!(state.read().unwrap(), vec!["flight-1".to_string()]);
//! ```

mod backend;
mod codec;
mod error;
mod store;

#[cfg(feature = "rocksdb")]
pub use backend::RocksBackend;
pub use backend::{Backend, MemoryBackend};
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use error::{Result, StoreError};
pub use store::{SharedState, Transaction, DEFAULT_CAPACITY};
