//! Flight planning API request and response bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flight::FlightInfo;
use super::geo::Volume4D;

/// Notification failures keyed by subscriber base URL.
pub type NotificationFailures = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertFlightPlanRequest {
    pub flight_plan: FlightInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanningResult {
    Planned,
    ReadyToFly,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteResult {
    Closed,
    Failed,
}

/// Detail attached to a `Failed` outcome caused by the registry or a peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureDiagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertFlightPlanResponse {
    pub result: PlanningResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub flight_plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_intent_id: Option<String>,
    #[serde(default)]
    pub notifications: NotificationFailures,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<FailureDiagnostics>,
}

impl UpsertFlightPlanResponse {
    pub fn rejected(flight_plan_id: &str, notes: impl Into<String>) -> Self {
        Self::outcome(flight_plan_id, PlanningResult::Rejected, Some(notes.into()))
    }

    pub fn failed(
        flight_plan_id: &str,
        notes: impl Into<String>,
        diagnostics: Option<FailureDiagnostics>,
    ) -> Self {
        Self {
            diagnostics,
            ..Self::outcome(flight_plan_id, PlanningResult::Failed, Some(notes.into()))
        }
    }

    fn outcome(flight_plan_id: &str, result: PlanningResult, notes: Option<String>) -> Self {
        Self {
            result,
            notes,
            flight_plan_id: flight_plan_id.to_string(),
            op_intent_id: None,
            notifications: NotificationFailures::new(),
            diagnostics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFlightPlanResponse {
    pub result: DeleteResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub notifications: NotificationFailures,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<FailureDiagnostics>,
}

impl DeleteFlightPlanResponse {
    pub fn closed(notifications: NotificationFailures) -> Self {
        Self {
            result: DeleteResult::Closed,
            notes: None,
            notifications,
            diagnostics: None,
        }
    }

    pub fn failed(notes: impl Into<String>, diagnostics: Option<FailureDiagnostics>) -> Self {
        Self {
            result: DeleteResult::Failed,
            notes: Some(notes.into()),
            notifications: NotificationFailures::new(),
            diagnostics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearAreaRequest {
    pub request_id: String,
    pub extent: Volume4D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearAreaOutcome {
    pub success: bool,
    pub message: String,
    pub flights_deleted: Vec<String>,
    pub op_intents_removed: Vec<String>,
    #[serde(default)]
    pub notifications: NotificationFailures,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearAreaResponse {
    pub outcome: ClearAreaOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Starting,
    Ready,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ServiceStatus,
    pub system_identity: String,
    pub api_name: String,
    pub api_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    pub capabilities: Vec<String>,
}
