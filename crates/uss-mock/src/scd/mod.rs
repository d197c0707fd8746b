//! Strategic conflict detection and operational intent sharing.
//!
//! [`ScdEngine`] owns everything a planning request needs: the flight locks
//! (and through them the flight store), the registry client, the
//! intersection predicate and the jurisdiction rules. It is built once at
//! startup and shared by the HTTP handlers and the housekeeping tasks.
//!
//! - `validation` - request checks that never touch the network
//! - `conflicts` - peer query, state machine and priority arbitration
//! - `sharing` - registry writes and subscriber notification
//! - `planning` - the request-level flows built from the above

mod conflicts;
mod planning;
mod sharing;
mod validation;


pub use conflicts::{check_for_disallowed_conflicts, get_down_uss_op_intent};
pub use validation::{validate_op_intent, validate_request, MAX_PLANNING_HORIZON_DAYS, MAX_VERTICES};

use std::sync::Arc;

use thiserror::Error;

use crate::database::FlightStore;
use crate::error::Error;
use crate::jurisdiction::Jurisdiction;
use crate::locking::FlightLocks;
use crate::models::{
    state_name, BoundingBoxIntersection, OperationalIntentState, UpsertFlightPlanResponse,
    VolumeIntersection,
};
use crate::registry::{RegistryClient, RegistryError};

/// A planning request refused on its own merits. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Conflict(String),

    #[error("Operational intent may not transition from {} to {}", state_name(.from), state_name(.to))]
    InvalidTransition {
        from: Option<OperationalIntentState>,
        to: Option<OperationalIntentState>,
    },
}

impl PlanningError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }
}

/// Why a planning flow stopped.
#[derive(Debug, Error)]
pub(crate) enum FlowError {
    #[error(transparent)]
    Rejected(#[from] PlanningError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Internal(#[from] Error),
}

impl From<uss_state::StoreError> for FlowError {
    fn from(e: uss_state::StoreError) -> Self {
        Self::Internal(e.into())
    }
}

impl FlowError {
    fn into_upsert_response(self, flight_plan_id: &str) -> UpsertFlightPlanResponse {
        match self {
            Self::Rejected(e) => UpsertFlightPlanResponse::rejected(flight_plan_id, e.to_string()),
            Self::Registry(e) => UpsertFlightPlanResponse::failed(
                flight_plan_id,
                format!("Error communicating with the registry or a peer USS: {e}"),
                Some(e.diagnostics()),
            ),
            Self::Internal(e) => UpsertFlightPlanResponse::failed(flight_plan_id, e.to_string(), None),
        }
    }
}

/// Who this USS is on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UssIdentity {
    /// Manager name reported to peers.
    pub manager: String,
    /// Base URL peers use to reach this USS.
    pub base_url: String,
}

impl UssIdentity {
    pub fn is_self(&self, uss_base_url: &str) -> bool {
        uss_base_url.trim_end_matches('/') == self.base_url.trim_end_matches('/')
    }
}

pub struct ScdEngine {
    identity: UssIdentity,
    locks: FlightLocks,
    registry: Arc<dyn RegistryClient>,
    geometry: Arc<dyn VolumeIntersection>,
    jurisdiction: Jurisdiction,
}

impl ScdEngine {
    pub fn new(identity: UssIdentity, locks: FlightLocks, registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            identity,
            locks,
            registry,
            geometry: Arc::new(BoundingBoxIntersection),
            jurisdiction: Jurisdiction::default(),
        }
    }

    #[must_use]
    pub fn with_jurisdiction(mut self, jurisdiction: Jurisdiction) -> Self {
        self.jurisdiction = jurisdiction;
        self
    }

    #[must_use]
    pub fn with_geometry(mut self, geometry: Arc<dyn VolumeIntersection>) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn identity(&self) -> &UssIdentity {
        &self.identity
    }

    pub fn jurisdiction(&self) -> &Jurisdiction {
        &self.jurisdiction
    }

    pub fn locks(&self) -> &FlightLocks {
        &self.locks
    }

    pub fn store(&self) -> &FlightStore {
        self.locks.store()
    }
}
