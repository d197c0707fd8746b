//! Request-level flows: upsert, delete, clear area, and the housekeeping
//! operations built on the same steps.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::{validate_request, FlowError, ScdEngine};
use crate::error::{Error, Result};
use crate::models::geo;
use crate::models::{
    ClearAreaOutcome, ClearAreaResponse, DeleteFlightPlanResponse, FlightInfo, FlightRecord,
    NotificationFailures, OperationalIntent, OperationalIntentState, PlanningResult,
    UpsertFlightPlanResponse, Volume4D,
};
use crate::registry::PutOperationalIntentDetailsParameters;

impl ScdEngine {
    /// Create or modify the flight `flight_plan_id`.
    ///
    /// Domain outcomes, including registry failures, are reported in the
    /// response rather than as errors.
    pub async fn upsert_flight_plan(
        &self,
        flight_plan_id: &str,
        flight_info: FlightInfo,
    ) -> UpsertFlightPlanResponse {
        match self.plan(flight_plan_id, flight_info, Utc::now()).await {
            Ok((op_intent, notifications)) => {
                let result = if op_intent.state() == OperationalIntentState::Accepted {
                    PlanningResult::Planned
                } else {
                    PlanningResult::ReadyToFly
                };
                info!(
                    flight_plan_id,
                    op_intent_id = op_intent.id(),
                    version = op_intent.reference.version,
                    ?result,
                    "flight planned"
                );
                UpsertFlightPlanResponse {
                    result,
                    notes: None,
                    flight_plan_id: flight_plan_id.to_string(),
                    op_intent_id: Some(op_intent.id().to_string()),
                    notifications,
                    diagnostics: None,
                }
            }
            Err(e) => {
                match &e {
                    FlowError::Rejected(reason) => info!(flight_plan_id, %reason, "flight rejected"),
                    other => warn!(flight_plan_id, error = %other, "flight planning failed"),
                }
                e.into_upsert_response(flight_plan_id)
            }
        }
    }

    async fn plan(
        &self,
        flight_plan_id: &str,
        flight_info: FlightInfo,
        now: DateTime<Utc>,
    ) -> std::result::Result<(OperationalIntent, NotificationFailures), FlowError> {
        let mut lock = self.locks.lock(flight_plan_id).await?;
        let existing = lock.existing().cloned();

        let (state, details) = validate_request(&flight_info, &self.jurisdiction, now)?;
        let key = self.check_op_intent(state, &details, existing.as_ref()).await?;
        let (op_intent, notifications) = self
            .share_op_intent(state, details, existing.as_ref(), key)
            .await?;

        let saved = lock.save(FlightRecord {
            op_intent: op_intent.clone(),
            flight_info,
            locked: true,
        });
        if let Err(e) = saved {
            self.withdraw_unsaved(flight_plan_id, &op_intent, existing.is_none())
                .await;
            return Err(e.into());
        }
        Ok((op_intent, notifications))
    }

    /// Handle an intent the registry accepted but the local store did not.
    ///
    /// A newly created intent is withdrawn again. A modified one is left in
    /// the registry ahead of the local record and only logged.
    async fn withdraw_unsaved(&self, flight_plan_id: &str, op_intent: &OperationalIntent, created: bool) {
        let op_intent_id = op_intent.id();
        if !created {
            warn!(flight_plan_id, op_intent_id, "modified operational intent could not be stored locally");
            return;
        }
        match self.delete_op_intent(&op_intent.reference).await {
            Ok(_) => warn!(flight_plan_id, op_intent_id, "withdrew operational intent that could not be stored"),
            Err(e) => error!(
                flight_plan_id,
                op_intent_id,
                error = %e,
                "operational intent left orphaned in the registry"
            ),
        }
    }

    /// End the flight `flight_plan_id` and withdraw its intent.
    pub async fn delete_flight_plan(&self, flight_plan_id: &str) -> DeleteFlightPlanResponse {
        match self.close_flight(flight_plan_id).await {
            Ok(Some(notifications)) => {
                info!(flight_plan_id, "flight closed");
                DeleteFlightPlanResponse::closed(notifications)
            }
            Ok(None) => DeleteFlightPlanResponse::failed(
                format!("Flight {flight_plan_id} does not exist"),
                None,
            ),
            Err(FlowError::Registry(e)) => {
                warn!(flight_plan_id, error = %e, "failed to delete operational intent");
                DeleteFlightPlanResponse::failed(
                    format!("Error deleting operational intent from the registry: {e}"),
                    Some(e.diagnostics()),
                )
            }
            Err(e) => {
                warn!(flight_plan_id, error = %e, "failed to delete flight");
                DeleteFlightPlanResponse::failed(e.to_string(), None)
            }
        }
    }

    /// Remove the record and its registry reference.
    ///
    /// The record is put back if the registry refuses, so the flight stays
    /// visible for a later attempt. `None` if there is no such flight.
    async fn close_flight(
        &self,
        flight_plan_id: &str,
    ) -> std::result::Result<Option<NotificationFailures>, FlowError> {
        let Some(record) = self.locks.delete(flight_plan_id).await? else {
            return Ok(None);
        };
        match self.delete_op_intent(&record.op_intent.reference).await {
            Ok(notifications) => Ok(Some(notifications)),
            Err(e) => {
                self.locks.restore(flight_plan_id, record)?;
                Err(e.into())
            }
        }
    }

    /// Remove every operational intent in `extent` from the registry, and
    /// any local flight or cache entry that refers to one.
    pub async fn clear_area(&self, extent: &Volume4D) -> ClearAreaResponse {
        let outcome = match self.clear_area_inner(extent).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "area clear failed");
                ClearAreaOutcome {
                    success: false,
                    message: e.to_string(),
                    flights_deleted: Vec::new(),
                    op_intents_removed: Vec::new(),
                    notifications: NotificationFailures::new(),
                    timestamp: Utc::now(),
                }
            }
        };
        ClearAreaResponse { outcome }
    }

    async fn clear_area_inner(
        &self,
        extent: &Volume4D,
    ) -> std::result::Result<ClearAreaOutcome, FlowError> {
        let references = self.registry.query_references(extent).await?;
        let db = self.store().read()?;

        let mut removed = BTreeSet::new();
        let mut notifications = NotificationFailures::new();
        let mut errors = Vec::new();
        for reference in references {
            let ovn = db
                .flight_for_intent(&reference.id)
                .and_then(|(_, record)| record.op_intent.reference.ovn.clone())
                .or_else(|| reference.ovn.clone())
                .unwrap_or_default();

            match self.registry.delete_reference(&reference.id, &ovn).await {
                Ok(response) => {
                    let failures = self
                        .notify_subscribers(&reference.id, None, &response.subscribers)
                        .await;
                    notifications.extend(failures);
                    removed.insert(reference.id);
                }
                Err(e) => {
                    warn!(op_intent_id = %reference.id, error = %e, "failed to remove operational intent");
                    errors.push(format!("Failed to remove operational intent {}: {e}", reference.id));
                }
            }
        }

        let flights_deleted = match self.locks.remove_for_intents(&removed).await {
            Ok(flights) => flights,
            Err(e) => {
                warn!(error = %e, "registry cleared but local flights were not removed");
                errors.push(format!("Failed to remove local flights: {e}"));
                Vec::new()
            }
        };
        info!(
            op_intents = removed.len(),
            flights = flights_deleted.len(),
            "area cleared"
        );

        let success = errors.is_empty();
        let message = if success {
            format!(
                "Removed {} operational intents and {} local flights",
                removed.len(),
                flights_deleted.len()
            )
        } else {
            errors.join("; ")
        };
        Ok(ClearAreaOutcome {
            success,
            message,
            flights_deleted,
            op_intents_removed: removed.into_iter().collect(),
            notifications,
            timestamp: Utc::now(),
        })
    }

    /// Close every unlocked flight whose intent ended before `now`.
    ///
    /// Flights that cannot be closed are logged and kept for the next pass.
    pub async fn expire_flights(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let db = self.store().read()?;
        let expired: Vec<String> = db
            .flights
            .iter()
            .filter_map(|(id, record)| {
                let record = record.as_ref().filter(|r| !r.locked)?;
                let end = geo::time_end(&record.op_intent.details.all_volumes())?;
                (end < now).then(|| id.clone())
            })
            .collect();

        let mut closed = Vec::new();
        for flight_plan_id in expired {
            match self.close_flight(&flight_plan_id).await {
                Ok(Some(_)) => {
                    info!(flight_plan_id, "expired flight removed");
                    closed.push(flight_plan_id);
                }
                Ok(None) => {}
                Err(e) => warn!(flight_plan_id, error = %e, "failed to remove expired flight"),
            }
        }
        Ok(closed)
    }

    /// Withdraw every flight this USS still has.
    pub async fn withdraw_all_flights(&self) -> Result<Vec<String>> {
        let flight_ids: Vec<String> = self
            .store()
            .read()?
            .flight_ids()
            .map(str::to_string)
            .collect();

        let mut withdrawn = Vec::new();
        let mut failures = Vec::new();
        for flight_plan_id in flight_ids {
            match self.close_flight(&flight_plan_id).await {
                Ok(Some(_)) => withdrawn.push(flight_plan_id),
                Ok(None) => {}
                Err(e) => failures.push(format!("{flight_plan_id}: {e}")),
            }
        }

        if failures.is_empty() {
            Ok(withdrawn)
        } else {
            Err(Error::Cleanup(failures.join("; ")))
        }
    }

    /// This USS's own intent `op_intent_id`, as served to peers.
    pub fn own_operational_intent(&self, op_intent_id: &str) -> Result<Option<OperationalIntent>> {
        Ok(self
            .store()
            .read()?
            .flight_for_intent(op_intent_id)
            .map(|(_, record)| record.op_intent.clone()))
    }

    /// Apply a peer's change notification to the cache.
    pub fn receive_notification(&self, notification: PutOperationalIntentDetailsParameters) -> Result<()> {
        let id = notification.operational_intent_id;
        self.store().update(|db| {
            match notification.operational_intent {
                Some(intent) => {
                    db.cached_operations.insert(id.clone(), intent);
                }
                None => {
                    db.cached_operations.remove(&id);
                }
            }
            Ok::<_, Error>(())
        })?;
        info!(op_intent_id = %id, "peer notification received");
        Ok(())
    }
}
