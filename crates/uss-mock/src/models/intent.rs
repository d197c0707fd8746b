//! Operational intents as exchanged with the registry and peers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::Volume4D;

/// Lowest priority an operational intent may carry.
pub const PRIORITY_LOWEST: i32 = 0;
/// Highest priority an operational intent may carry.
pub const PRIORITY_HIGHEST: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalIntentState {
    Accepted,
    Activated,
    Nonconforming,
    Contingent,
}

impl OperationalIntentState {
    pub const ALL: [OperationalIntentState; 4] = [
        Self::Accepted,
        Self::Activated,
        Self::Nonconforming,
        Self::Contingent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Activated => "Activated",
            Self::Nonconforming => "Nonconforming",
            Self::Contingent => "Contingent",
        }
    }

    /// Accepted or Activated: the states that carry nominal volumes.
    pub fn is_nominal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Activated)
    }
}

impl fmt::Display for OperationalIntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationalIntentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown operational intent state '{s}'"))
    }
}

/// Name of an optional state, `(none)` when absent.
pub fn state_name(state: &Option<OperationalIntentState>) -> &'static str {
    state.as_ref().map_or("(none)", OperationalIntentState::as_str)
}

/// Whether an intent may move from `from` to `to`.
///
/// `None` as `from` means no prior intent exists; `None` as `to` means the
/// intent is being deleted.
pub fn op_intent_transition_valid(
    from: Option<OperationalIntentState>,
    to: Option<OperationalIntentState>,
) -> bool {
    use OperationalIntentState::*;

    match (from, to) {
        (None, Some(Accepted | Activated)) => true,
        (None, _) => false,
        (Some(Accepted), _) => true,
        (Some(Activated), Some(Activated | Nonconforming | Contingent) | None) => true,
        (Some(Nonconforming), Some(Nonconforming | Activated | Contingent) | None) => true,
        (Some(Contingent), Some(Contingent) | None) => true,
        _ => false,
    }
}

/// Registry's view of a USS's reachability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UssAvailability {
    #[default]
    Unknown,
    Normal,
    Down,
}

/// The registry record for an operational intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntentReference {
    pub id: String,
    pub manager: String,
    #[serde(default)]
    pub uss_availability: UssAvailability,
    pub version: i32,
    pub state: OperationalIntentState,
    /// Only disclosed to the managing USS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovn: Option<String>,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub uss_base_url: String,
    #[serde(default)]
    pub subscription_id: String,
}

/// The details a managing USS serves to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntentDetails {
    #[serde(default)]
    pub volumes: Vec<Volume4D>,
    #[serde(default)]
    pub off_nominal_volumes: Vec<Volume4D>,
    #[serde(default)]
    pub priority: i32,
}

impl OperationalIntentDetails {
    /// Nominal followed by off-nominal volumes.
    pub fn all_volumes(&self) -> Vec<Volume4D> {
        self.volumes
            .iter()
            .chain(self.off_nominal_volumes.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalIntent {
    pub reference: OperationalIntentReference,
    pub details: OperationalIntentDetails,
}

impl OperationalIntent {
    pub fn id(&self) -> &str {
        &self.reference.id
    }

    pub fn state(&self) -> OperationalIntentState {
        self.reference.state
    }

    pub fn priority(&self) -> i32 {
        self.details.priority
    }
}
