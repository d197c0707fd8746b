//! This USS's own flights.

use serde::{Deserialize, Serialize};

use super::geo::Volume4D;
use super::intent::{OperationalIntent, OperationalIntentDetails, OperationalIntentState};

/// Where the operator is in the flight lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageState {
    Planned,
    InUse,
    Closed,
}

/// Whether the aircraft is conforming to its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UasState {
    Nominal,
    OffNominal,
    Contingent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicFlightPlanInformation {
    pub usage_state: UsageState,
    pub uas_state: UasState,
    #[serde(default)]
    pub area: Vec<Volume4D>,
}

/// U-space flight authorisation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightAuthorisationData {
    pub uas_serial_number: String,
    #[serde(default)]
    pub operation_mode: String,
    #[serde(default)]
    pub operation_category: String,
    pub uas_class: String,
    #[serde(default)]
    pub identification_technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uas_type_certificate: Option<String>,
    #[serde(default)]
    pub connectivity_methods: Vec<String>,
    pub endurance_minutes: i64,
    pub emergency_procedure_url: String,
    pub operator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uas_id: Option<String>,
}

/// A flight plan as submitted by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightInfo {
    pub basic_information: BasicFlightPlanInformation,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uspace_flight_authorisation: Option<FlightAuthorisationData>,
    /// Anything else the client sent; kept verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub additional_information: serde_json::Value,
}

impl FlightInfo {
    /// Operational intent state implied by the plan, or `None` for a closed plan.
    pub fn intent_state(&self) -> Option<OperationalIntentState> {
        let info = &self.basic_information;
        match (info.usage_state, info.uas_state) {
            (UsageState::Closed, _) => None,
            (UsageState::Planned, _) => Some(OperationalIntentState::Accepted),
            (UsageState::InUse, UasState::Nominal) => Some(OperationalIntentState::Activated),
            (UsageState::InUse, UasState::OffNominal) => {
                Some(OperationalIntentState::Nonconforming)
            }
            (UsageState::InUse, UasState::Contingent) => Some(OperationalIntentState::Contingent),
        }
    }

    /// Details to publish for `state`. The area is nominal in nominal states
    /// and off-nominal otherwise.
    pub fn intent_details(&self, state: OperationalIntentState) -> OperationalIntentDetails {
        let area = self.basic_information.area.clone();
        let (volumes, off_nominal_volumes) = if state.is_nominal() {
            (area, Vec::new())
        } else {
            (Vec::new(), area)
        };
        OperationalIntentDetails {
            volumes,
            off_nominal_volumes,
            priority: self.priority,
        }
    }
}

/// One of this USS's flights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub op_intent: OperationalIntent,
    pub flight_info: FlightInfo,
    #[serde(default)]
    pub locked: bool,
}
