//! Mock USS - Strategic Conflict Detection Test Participant
//!
//! A UAS service supplier that plans flights against a shared registry
//! (DSS), arbitrates conflicts with peer USSs by priority and shares its
//! operational intents with subscribers.
//!
//! # Architecture
//!
//! - **Models**: Flight plans, operational intents and 4D volumes
//! - **Database**: Flight records and peer-intent cache in shared state
//! - **Locking**: Per-flight locks over the shared store
//! - **Registry**: Client for the DSS and peer USSs
//! - **SCD**: Validation, conflict checks and intent sharing
//! - **Housekeeping**: Expired-flight sweep, startup and shutdown tasks
//! - **API**: Flight planning and peer HTTP endpoints
//!
//! # Example
//!
//! ```no_run
//! use mock_uss::{UssConfig, UssNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UssConfig::from_env()?;
//!     let node = UssNode::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod database;
pub mod error;
pub mod housekeeping;
pub mod jurisdiction;
pub mod locking;
pub mod models;
pub mod node;
pub mod registry;
pub mod scd;

#[cfg(test)]
mod testing;

pub use database::{Database, FlightStore};
pub use error::{Error, Result};
pub use jurisdiction::Jurisdiction;
pub use locking::{FlightLock, FlightLocks, LockConfig};
pub use node::{UssConfig, UssNode};
pub use registry::{HttpRegistryClient, RegistryClient, RegistryError};
pub use scd::{PlanningError, ScdEngine, UssIdentity};
