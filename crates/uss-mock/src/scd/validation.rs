//! Checks run before any registry interaction.

use chrono::{DateTime, Duration, Utc};

use super::PlanningError;
use crate::jurisdiction::{validate_flight_authorisation, Jurisdiction};
use crate::models::geo;
use crate::models::{
    FlightInfo, OperationalIntentDetails, OperationalIntentState, PRIORITY_HIGHEST,
    PRIORITY_LOWEST,
};

/// Most vertices an intent may carry across all its volumes.
pub const MAX_VERTICES: usize = 10_000;

/// How far ahead an Accepted intent may start.
pub const MAX_PLANNING_HORIZON_DAYS: i64 = 30;

/// Derive the intent for `flight_info` and check it, along with any
/// authorisation the jurisdiction demands.
pub fn validate_request(
    flight_info: &FlightInfo,
    jurisdiction: &Jurisdiction,
    now: DateTime<Utc>,
) -> Result<(OperationalIntentState, OperationalIntentDetails), PlanningError> {
    let Some(state) = flight_info.intent_state() else {
        return Err(PlanningError::validation(
            "A Closed flight plan cannot be upserted; delete it instead",
        ));
    };
    let details = flight_info.intent_details(state);
    validate_op_intent(state, &details, now)?;

    if jurisdiction.require_flight_authorisation {
        match &flight_info.uspace_flight_authorisation {
            None => {
                return Err(PlanningError::validation(
                    "Flight authorisation data is required in this jurisdiction",
                ))
            }
            Some(data) => validate_flight_authorisation(data).map_err(PlanningError::Validation)?,
        }
    }

    Ok((state, details))
}

/// Intrinsic checks on an intent in `state` with `details`, as of `now`.
pub fn validate_op_intent(
    state: OperationalIntentState,
    details: &OperationalIntentDetails,
    now: DateTime<Utc>,
) -> Result<(), PlanningError> {
    let all_volumes = details.all_volumes();
    if all_volumes.is_empty() {
        return Err(PlanningError::validation("Operational intent has no volumes"));
    }

    let vertices = geo::vertex_count(&all_volumes);
    if vertices > MAX_VERTICES {
        return Err(PlanningError::validation(format!(
            "Too many vertices across volumes of operational intent ({vertices} > {MAX_VERTICES})"
        )));
    }

    if !(PRIORITY_LOWEST..=PRIORITY_HIGHEST).contains(&details.priority) {
        return Err(PlanningError::validation(format!(
            "Priority {} is outside [{PRIORITY_LOWEST}, {PRIORITY_HIGHEST}]",
            details.priority
        )));
    }

    if state.is_nominal() && !details.off_nominal_volumes.is_empty() {
        return Err(PlanningError::validation(format!(
            "Operational intent specifies off-nominal volumes while in the {state} state"
        )));
    }
    if !state.is_nominal() && !details.volumes.is_empty() {
        return Err(PlanningError::validation(format!(
            "Operational intent specifies nominal volumes while in the {state} state"
        )));
    }

    if state == OperationalIntentState::Accepted {
        if let Some(start) = geo::time_start(&all_volumes) {
            if start > now + Duration::days(MAX_PLANNING_HORIZON_DAYS) {
                return Err(PlanningError::validation(format!(
                    "Operational intent to plan is too far away in time (max {MAX_PLANNING_HORIZON_DAYS} days)"
                )));
            }
        }
    }

    if let Some(end) = geo::time_end(&all_volumes) {
        if end < now {
            return Err(PlanningError::validation(format!(
                "Operational intent ended in the past ({end})"
            )));
        }
    }

    if state == OperationalIntentState::Activated
        && !details.volumes.iter().any(|v| v.is_active_at(now))
    {
        return Err(PlanningError::validation(format!(
            "Operational intent is Activated but none of its volumes is active at {now}"
        )));
    }

    Ok(())
}
