//! In-memory registry and peer network, plus builders for test data.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::database::FlightStore;
use crate::locking::{FlightLocks, LockConfig};
use crate::models::geo::{self, fixtures::square};
use crate::models::{
    BasicFlightPlanInformation, BoundingBoxIntersection, FlightInfo, FlightRecord,
    OperationalIntent, OperationalIntentDetails, OperationalIntentReference,
    OperationalIntentState, UasState, UsageState, UssAvailability, Volume4D, VolumeIntersection,
};
use crate::registry::{
    ChangeOperationalIntentReferenceResponse, PutOperationalIntentDetailsParameters,
    PutOperationalIntentReferenceParameters, RegistryClient, RegistryError, SubscriberToNotify,
    SubscriptionState,
};
use crate::scd::{ScdEngine, UssIdentity};

pub const OWN_MANAGER: &str = "mock_uss";
pub const OWN_BASE_URL: &str = "http://mock-uss.local";

/// Base URL of the fake peer called `manager`.
pub fn peer_url(manager: &str) -> String {
    format!("http://{manager}.local")
}

/// One square volume around a point, active from a minute ago for an hour.
pub fn now_area(lat: f64, lng: f64) -> Vec<Volume4D> {
    let now = Utc::now();
    vec![square(
        lat,
        lng,
        0.01,
        now - chrono::Duration::minutes(1),
        now + chrono::Duration::hours(1),
    )]
}

pub fn peer_intent(
    id: &str,
    manager: &str,
    priority: i32,
    state: OperationalIntentState,
    volumes: Vec<Volume4D>,
) -> OperationalIntent {
    let now = Utc::now();
    OperationalIntent {
        reference: OperationalIntentReference {
            id: id.to_string(),
            manager: manager.to_string(),
            uss_availability: UssAvailability::Normal,
            version: 1,
            state,
            ovn: Some(format!("ovn-{id}-1")),
            time_start: geo::time_start(&volumes).unwrap_or(now),
            time_end: geo::time_end(&volumes).unwrap_or(now),
            uss_base_url: peer_url(manager),
            subscription_id: format!("sub-{id}"),
        },
        details: OperationalIntentDetails {
            volumes,
            off_nominal_volumes: Vec::new(),
            priority,
        },
    }
}

pub fn flight_plan(
    priority: i32,
    usage_state: UsageState,
    uas_state: UasState,
    area: Vec<Volume4D>,
) -> FlightInfo {
    FlightInfo {
        basic_information: BasicFlightPlanInformation {
            usage_state,
            uas_state,
            area,
        },
        priority,
        uspace_flight_authorisation: None,
        additional_information: serde_json::Value::Null,
    }
}

/// An unlocked Accepted flight owning intent `op_intent_id`.
pub fn sample_record(op_intent_id: &str) -> FlightRecord {
    let mut op_intent = peer_intent(
        op_intent_id,
        OWN_MANAGER,
        10,
        OperationalIntentState::Accepted,
        now_area(46.0, 7.0),
    );
    op_intent.reference.uss_base_url = OWN_BASE_URL.to_string();
    FlightRecord {
        op_intent,
        flight_info: flight_plan(10, UsageState::Planned, UasState::Nominal, now_area(46.0, 7.0)),
        locked: false,
    }
}

pub fn fast_lock_config() -> LockConfig {
    LockConfig::default()
        .with_backoff(Duration::from_millis(10))
        .with_timeouts(Duration::from_millis(300))
}

/// Engine over a fresh in-memory store talking to `registry`.
pub fn engine(registry: Arc<FakeRegistry>) -> ScdEngine {
    let store = Arc::new(FlightStore::in_memory("flights").unwrap());
    ScdEngine::new(
        UssIdentity {
            manager: OWN_MANAGER.to_string(),
            base_url: OWN_BASE_URL.to_string(),
        },
        FlightLocks::new(store, fast_lock_config()),
        registry,
    )
}

#[derive(Default)]
struct FakeState {
    intents: BTreeMap<String, OperationalIntent>,
    unreachable: BTreeSet<String>,
    refusing_notifications: BTreeSet<String>,
    subscribers: Vec<SubscriberToNotify>,
    write_failure: Option<RegistryError>,
    calls: Vec<String>,
    notifications: Vec<(String, PutOperationalIntentDetailsParameters)>,
}

/// Registry plus every peer USS, recording each call made against it.
#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<FakeState>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Register a peer intent, served by its manager.
    pub fn add_intent(&self, intent: OperationalIntent) {
        self.with(|s| s.intents.insert(intent.id().to_string(), intent));
    }

    /// Make the manager of `op_intent_id` stop answering detail requests.
    pub fn make_unreachable(&self, op_intent_id: &str) {
        self.with(|s| s.unreachable.insert(op_intent_id.to_string()));
    }

    pub fn set_availability(&self, op_intent_id: &str, availability: UssAvailability) {
        self.with(|s| {
            if let Some(intent) = s.intents.get_mut(op_intent_id) {
                intent.reference.uss_availability = availability;
            }
        });
    }

    pub fn refuse_notifications(&self, uss_base_url: &str) {
        self.with(|s| s.refusing_notifications.insert(uss_base_url.to_string()));
    }

    /// Subscribers returned with every reference change.
    pub fn set_subscribers(&self, urls: &[&str]) {
        let subscribers = urls
            .iter()
            .map(|url| SubscriberToNotify {
                subscriptions: vec![SubscriptionState {
                    subscription_id: format!("sub-{url}"),
                    notification_index: 1,
                }],
                uss_base_url: url.to_string(),
            })
            .collect();
        self.with(|s| s.subscribers = subscribers);
    }

    /// Fail every create and update with `error`.
    pub fn fail_writes(&self, error: RegistryError) {
        self.with(|s| s.write_failure = Some(error));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn notifications(&self) -> Vec<(String, PutOperationalIntentDetailsParameters)> {
        self.with(|s| s.notifications.clone())
    }

    pub fn intent(&self, id: &str) -> Option<OperationalIntent> {
        self.with(|s| s.intents.get(id).cloned())
    }

    pub fn intent_ids(&self) -> Vec<String> {
        self.with(|s| s.intents.keys().cloned().collect())
    }

    fn write(
        s: &mut FakeState,
        id: &str,
        version: i32,
        params: &PutOperationalIntentReferenceParameters,
    ) -> ChangeOperationalIntentReferenceResponse {
        let now = Utc::now();
        let reference = OperationalIntentReference {
            id: id.to_string(),
            manager: OWN_MANAGER.to_string(),
            uss_availability: UssAvailability::Normal,
            version,
            state: params.state,
            ovn: Some(format!("ovn-{id}-{version}")),
            time_start: geo::time_start(&params.extents).unwrap_or(now),
            time_end: geo::time_end(&params.extents).unwrap_or(now),
            uss_base_url: params.uss_base_url.clone(),
            subscription_id: format!("sub-{id}"),
        };
        let (volumes, off_nominal_volumes) = if params.state.is_nominal() {
            (params.extents.clone(), Vec::new())
        } else {
            (Vec::new(), params.extents.clone())
        };
        s.intents.insert(
            id.to_string(),
            OperationalIntent {
                reference: reference.clone(),
                details: OperationalIntentDetails {
                    volumes,
                    off_nominal_volumes,
                    priority: 0,
                },
            },
        );
        ChangeOperationalIntentReferenceResponse {
            subscribers: s.subscribers.clone(),
            operational_intent_reference: reference,
        }
    }
}

fn not_found(id: &str) -> RegistryError {
    RegistryError::Query {
        status: Some(404),
        message: format!("operational intent {id} not found"),
        payload: None,
    }
}

fn check_ovn(intent: &OperationalIntent, ovn: &str) -> Result<(), RegistryError> {
    if intent.reference.ovn.as_deref() == Some(ovn) {
        Ok(())
    } else {
        Err(RegistryError::Query {
            status: Some(409),
            message: format!("stale OVN for {}", intent.id()),
            payload: Some(format!("{{\"message\":\"OVN {ovn} does not match\"}}")),
        })
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn query_references(
        &self,
        area: &Volume4D,
    ) -> Result<Vec<OperationalIntentReference>, RegistryError> {
        self.with(|s| {
            s.calls.push("query".to_string());
            Ok(s.intents
                .values()
                .filter(|intent| {
                    BoundingBoxIntersection
                        .any_intersect(std::slice::from_ref(area), &intent.details.all_volumes())
                })
                .map(|intent| intent.reference.clone())
                .collect())
        })
    }

    async fn get_details(
        &self,
        _uss_base_url: &str,
        id: &str,
    ) -> Result<OperationalIntent, RegistryError> {
        self.with(|s| {
            s.calls.push(format!("details:{id}"));
            if s.unreachable.contains(id) {
                return Err(RegistryError::Connection {
                    message: format!("manager of {id} did not respond"),
                    trace: "connection timed out".to_string(),
                });
            }
            s.intents.get(id).cloned().ok_or_else(|| not_found(id))
        })
    }

    async fn create_reference(
        &self,
        id: &str,
        params: &PutOperationalIntentReferenceParameters,
    ) -> Result<ChangeOperationalIntentReferenceResponse, RegistryError> {
        self.with(|s| {
            s.calls.push(format!("create:{id}"));
            if let Some(error) = &s.write_failure {
                return Err(error.clone());
            }
            Ok(Self::write(s, id, 1, params))
        })
    }

    async fn update_reference(
        &self,
        id: &str,
        ovn: &str,
        params: &PutOperationalIntentReferenceParameters,
    ) -> Result<ChangeOperationalIntentReferenceResponse, RegistryError> {
        self.with(|s| {
            s.calls.push(format!("update:{id}"));
            if let Some(error) = &s.write_failure {
                return Err(error.clone());
            }
            let current = s.intents.get(id).ok_or_else(|| not_found(id))?;
            check_ovn(current, ovn)?;
            let version = current.reference.version + 1;
            Ok(Self::write(s, id, version, params))
        })
    }

    async fn delete_reference(
        &self,
        id: &str,
        ovn: &str,
    ) -> Result<ChangeOperationalIntentReferenceResponse, RegistryError> {
        self.with(|s| {
            s.calls.push(format!("delete:{id}"));
            let current = s.intents.get(id).ok_or_else(|| not_found(id))?;
            check_ovn(current, ovn)?;
            let removed = s.intents.remove(id).ok_or_else(|| not_found(id))?;
            Ok(ChangeOperationalIntentReferenceResponse {
                subscribers: s.subscribers.clone(),
                operational_intent_reference: removed.reference,
            })
        })
    }

    async fn notify_details_changed(
        &self,
        uss_base_url: &str,
        payload: &PutOperationalIntentDetailsParameters,
    ) -> Result<(), RegistryError> {
        self.with(|s| {
            s.calls.push(format!("notify:{uss_base_url}"));
            s.notifications
                .push((uss_base_url.to_string(), payload.clone()));
            if s.refusing_notifications.contains(uss_base_url) {
                Err(RegistryError::Connection {
                    message: format!("{uss_base_url} refused the notification"),
                    trace: "connection refused".to_string(),
                })
            } else {
                Ok(())
            }
        })
    }
}
