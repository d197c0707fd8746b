//! Peer discovery and conflict arbitration.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::{FlowError, PlanningError, ScdEngine};
use crate::error::Error;
use crate::jurisdiction::Jurisdiction;
use crate::models::{
    bounding_volume, op_intent_transition_valid, FlightRecord, OperationalIntent,
    OperationalIntentDetails, OperationalIntentReference, OperationalIntentState,
    UssAvailability, Volume4D, VolumeIntersection, PRIORITY_HIGHEST, PRIORITY_LOWEST,
};

/// Worst-case stand-in for an intent whose manager cannot be reached.
///
/// An Accepted intent is assumed to have the lowest priority over the whole
/// `area`, an Activated one the highest, and an off-nominal one the highest
/// priority over off-nominal volumes covering `area`.
pub fn get_down_uss_op_intent(
    area: &Volume4D,
    reference: &OperationalIntentReference,
) -> OperationalIntent {
    let area = vec![area.clone()];
    let details = match reference.state {
        OperationalIntentState::Accepted => OperationalIntentDetails {
            volumes: area,
            off_nominal_volumes: Vec::new(),
            priority: PRIORITY_LOWEST,
        },
        OperationalIntentState::Activated => OperationalIntentDetails {
            volumes: area,
            off_nominal_volumes: Vec::new(),
            priority: PRIORITY_HIGHEST,
        },
        OperationalIntentState::Nonconforming | OperationalIntentState::Contingent => {
            OperationalIntentDetails {
                volumes: Vec::new(),
                off_nominal_volumes: area,
                priority: PRIORITY_HIGHEST,
            }
        }
    };
    OperationalIntent {
        reference: reference.clone(),
        details,
    }
}

/// Reject the new intent if it intersects a peer it may not overlap.
///
/// Only nominal (Accepted or Activated) intents are checked. `existing` is
/// the previous version of the flight being modified, if any.
pub fn check_for_disallowed_conflicts(
    new_state: OperationalIntentState,
    new_details: &OperationalIntentDetails,
    existing: Option<&OperationalIntent>,
    peers: &[OperationalIntent],
    jurisdiction: &Jurisdiction,
    geometry: &dyn VolumeIntersection,
) -> Result<(), PlanningError> {
    if !new_state.is_nominal() {
        return Ok(());
    }

    for peer in peers {
        if existing.is_some_and(|e| e.id() == peer.id()) {
            debug!(op_intent_id = peer.id(), "skipping past version of the flight being modified");
            continue;
        }

        if new_details.priority > peer.priority() {
            debug!(
                op_intent_id = peer.id(),
                new_priority = new_details.priority,
                peer_priority = peer.priority(),
                "skipping lower priority operational intent"
            );
            continue;
        }

        if new_details.priority == peer.priority()
            && jurisdiction.allows_same_priority_intersections(peer.priority())
        {
            debug!(op_intent_id = peer.id(), "skipping same priority operational intent");
            continue;
        }

        let peer_volumes = peer.details.all_volumes();

        if let Some(existing) = existing {
            if existing.state() == OperationalIntentState::Activated
                && new_state == OperationalIntentState::Activated
                && peer.state() == OperationalIntentState::Activated
                && geometry.any_intersect(&existing.details.volumes, &peer_volumes)
            {
                debug!(
                    op_intent_id = peer.id(),
                    "skipping conflict that already existed with the previous version"
                );
                continue;
            }
        }

        if geometry.any_intersect(&new_details.volumes, &peer_volumes) {
            info!(
                op_intent_id = peer.id(),
                manager = %peer.reference.manager,
                "requested operational intent conflicts with peer"
            );
            return Err(PlanningError::Conflict(format!(
                "Requested operational intent (priority {}) conflicts with operational intent {} managed by {} (priority {})",
                new_details.priority,
                peer.id(),
                peer.reference.manager,
                peer.priority(),
            )));
        }
    }

    Ok(())
}

impl ScdEngine {
    /// Every operational intent the registry knows in `area`, with details.
    ///
    /// Own flights are answered from the local record. Peer details are read
    /// through the cache, which is refreshed whenever the registry reports a
    /// version the cache has not seen.
    pub(crate) async fn query_operational_intents(
        &self,
        area: &Volume4D,
    ) -> Result<Vec<OperationalIntent>, FlowError> {
        let references = self.registry.query_references(area).await?;
        let db = self.store().read()?;

        let mut intents = Vec::with_capacity(references.len());
        let mut fetched = Vec::new();
        for mut reference in references {
            if let Some((_, record)) = db.flight_for_intent(&reference.id) {
                if reference.ovn.is_none() {
                    reference.ovn = record.op_intent.reference.ovn.clone();
                }
                intents.push(OperationalIntent {
                    reference,
                    details: record.op_intent.details.clone(),
                });
                continue;
            }

            if let Some(cached) = db.cached_operations.get(&reference.id) {
                if cached.reference.version == reference.version {
                    intents.push(cached.clone());
                    continue;
                }
            }

            match self
                .registry
                .get_details(&reference.uss_base_url, &reference.id)
                .await
            {
                Ok(intent) => {
                    fetched.push(intent.clone());
                    intents.push(intent);
                }
                Err(e) if reference.uss_availability == UssAvailability::Down => {
                    warn!(
                        op_intent_id = %reference.id,
                        manager = %reference.manager,
                        error = %e,
                        "peer USS is down; assuming worst-case operational intent"
                    );
                    intents.push(get_down_uss_op_intent(area, &reference));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !fetched.is_empty() {
            self.store().update(|db| {
                for intent in fetched {
                    db.cache_if_newer(intent);
                }
                Ok::<_, Error>(())
            })?;
        }

        Ok(intents)
    }

    /// Check the state transition and conflicts for a new intent version.
    ///
    /// Returns the OVNs of every intent seen in the area, for use as the
    /// registry write key.
    pub(crate) async fn check_op_intent(
        &self,
        new_state: OperationalIntentState,
        new_details: &OperationalIntentDetails,
        existing: Option<&FlightRecord>,
    ) -> Result<Vec<String>, FlowError> {
        let existing = existing.map(|record| &record.op_intent);
        let from = existing.map(OperationalIntent::state);
        if !op_intent_transition_valid(from, Some(new_state)) {
            return Err(PlanningError::InvalidTransition {
                from,
                to: Some(new_state),
            }
            .into());
        }

        if !new_state.is_nominal() {
            return Ok(Vec::new());
        }

        let Some(area) = bounding_volume(&new_details.all_volumes()) else {
            return Err(PlanningError::validation("Operational intent has no volumes").into());
        };
        let peers = self.query_operational_intents(&area).await?;

        check_for_disallowed_conflicts(
            new_state,
            new_details,
            existing,
            &peers,
            &self.jurisdiction,
            self.geometry.as_ref(),
        )?;

        let key: BTreeSet<String> = peers
            .iter()
            .filter_map(|intent| intent.reference.ovn.clone())
            .collect();
        Ok(key.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBoxIntersection;
    use crate::testing::{now_area, peer_intent};

    fn details(priority: i32) -> OperationalIntentDetails {
        OperationalIntentDetails {
            volumes: now_area(46.0, 7.0),
            off_nominal_volumes: vec![],
            priority,
        }
    }

    fn check(
        new_priority: i32,
        peer: &OperationalIntent,
        jurisdiction: Jurisdiction,
    ) -> Result<(), PlanningError> {
        check_for_disallowed_conflicts(
            OperationalIntentState::Accepted,
            &details(new_priority),
            None,
            std::slice::from_ref(peer),
            &jurisdiction,
            &BoundingBoxIntersection,
        )
    }

    #[test]
    fn lower_priority_peer_is_skipped() {
        let peer = peer_intent("op2", "uss2", 40, OperationalIntentState::Accepted, now_area(46.0, 7.0));
        assert!(check(50, &peer, Jurisdiction::default()).is_ok());
    }

    #[test]
    fn higher_priority_peer_conflict_names_manager_and_id() {
        let peer = peer_intent("op2", "uss2", 60, OperationalIntentState::Accepted, now_area(46.0, 7.0));
        let err = check(50, &peer, Jurisdiction::default()).unwrap_err();
        let PlanningError::Conflict(message) = err else {
            panic!("expected a conflict");
        };
        assert!(message.contains("op2"));
        assert!(message.contains("uss2"));
        assert!(message.contains("priority 60"));
    }

    #[test]
    fn equal_priority_depends_on_jurisdiction() {
        let peer = peer_intent("op2", "uss2", 50, OperationalIntentState::Accepted, now_area(46.0, 7.0));
        assert!(check(50, &peer, Jurisdiction::default()).is_err());
        let lenient = Jurisdiction::default().with_same_priority_intersections(true);
        assert!(check(50, &peer, lenient).is_ok());
    }

    #[test]
    fn non_intersecting_peer_is_not_a_conflict() {
        let peer = peer_intent("op2", "uss2", 90, OperationalIntentState::Accepted, now_area(10.0, 10.0));
        assert!(check(50, &peer, Jurisdiction::default()).is_ok());
    }

    #[test]
    fn off_nominal_peer_volumes_count() {
        let mut peer = peer_intent("op2", "uss2", 90, OperationalIntentState::Contingent, vec![]);
        peer.details.off_nominal_volumes = now_area(46.0, 7.0);
        assert!(check(50, &peer, Jurisdiction::default()).is_err());
    }

    #[test]
    fn off_nominal_new_intent_is_not_checked() {
        let peer = peer_intent("op2", "uss2", 90, OperationalIntentState::Activated, now_area(46.0, 7.0));
        let contingent = OperationalIntentDetails {
            volumes: vec![],
            off_nominal_volumes: now_area(46.0, 7.0),
            priority: 10,
        };
        let result = check_for_disallowed_conflicts(
            OperationalIntentState::Contingent,
            &contingent,
            None,
            &[peer],
            &Jurisdiction::default(),
            &BoundingBoxIntersection,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn pre_existing_conflict_between_activated_intents_is_grandfathered() {
        let peer = peer_intent("op2", "uss2", 90, OperationalIntentState::Activated, now_area(46.0, 7.0));
        let existing = peer_intent("op1", "mock_uss", 10, OperationalIntentState::Activated, now_area(46.0, 7.0));

        let result = check_for_disallowed_conflicts(
            OperationalIntentState::Activated,
            &details(10),
            Some(&existing),
            std::slice::from_ref(&peer),
            &Jurisdiction::default(),
            &BoundingBoxIntersection,
        );
        assert!(result.is_ok());

        let mut accepted_peer = peer.clone();
        accepted_peer.reference.state = OperationalIntentState::Accepted;
        let result = check_for_disallowed_conflicts(
            OperationalIntentState::Activated,
            &details(10),
            Some(&existing),
            &[accepted_peer],
            &Jurisdiction::default(),
            &BoundingBoxIntersection,
        );
        assert!(result.is_err());
    }

    #[test]
    fn down_uss_stand_in_is_conservative() {
        let area = now_area(46.0, 7.0).remove(0);
        let mut reference = peer_intent("op2", "uss2", 0, OperationalIntentState::Accepted, vec![]).reference;

        let accepted = get_down_uss_op_intent(&area, &reference);
        assert_eq!(accepted.priority(), PRIORITY_LOWEST);
        assert_eq!(accepted.details.volumes, vec![area.clone()]);

        reference.state = OperationalIntentState::Activated;
        assert_eq!(get_down_uss_op_intent(&area, &reference).priority(), PRIORITY_HIGHEST);

        reference.state = OperationalIntentState::Nonconforming;
        let nonconforming = get_down_uss_op_intent(&area, &reference);
        assert_eq!(nonconforming.priority(), PRIORITY_HIGHEST);
        assert!(nonconforming.details.volumes.is_empty());
        assert_eq!(nonconforming.details.off_nominal_volumes, vec![area]);
    }
}
