//! The flight record store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uss_state::{JsonCodec, SharedState};

use crate::models::{FlightRecord, OperationalIntent};

/// Everything this USS remembers about flights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    /// Own flights by flight plan id. `None` reserves an id while its first
    /// plan is being created.
    #[serde(default)]
    pub flights: BTreeMap<String, Option<FlightRecord>>,

    /// Peer operational intents by id, as last fetched.
    #[serde(default)]
    pub cached_operations: BTreeMap<String, OperationalIntent>,
}

/// Shared store holding the [`Database`].
pub type FlightStore = SharedState<Database, JsonCodec>;

impl Database {
    /// The own flight whose operational intent is `op_intent_id`.
    pub fn flight_for_intent(&self, op_intent_id: &str) -> Option<(&str, &FlightRecord)> {
        self.flights.iter().find_map(|(id, record)| match record {
            Some(record) if record.op_intent.reference.id == op_intent_id => {
                Some((id.as_str(), record))
            }
            _ => None,
        })
    }

    /// Ids of flights that are fully created.
    pub fn flight_ids(&self) -> impl Iterator<Item = &str> {
        self.flights
            .iter()
            .filter(|(_, record)| record.is_some())
            .map(|(id, _)| id.as_str())
    }

    /// Cache a peer intent unless an equal or newer version is already held.
    /// Returns whether the cache changed.
    pub fn cache_if_newer(&mut self, intent: OperationalIntent) -> bool {
        match self.cached_operations.get(intent.id()) {
            Some(cached) if cached.reference.version > intent.reference.version => false,
            _ => {
                self.cached_operations.insert(intent.id().to_string(), intent);
                true
            }
        }
    }

    /// Drop locks left by a previous process: unlock every record and remove
    /// placeholders of flights that were never created. Returns how many
    /// flights were touched.
    pub fn release_stale_locks(&mut self) -> usize {
        let before = self.flights.len();
        self.flights.retain(|_, record| record.is_some());
        let mut touched = before - self.flights.len();
        for record in self.flights.values_mut().flatten() {
            if record.locked {
                record.locked = false;
                touched += 1;
            }
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_record;

    #[test]
    fn stale_locks_and_placeholders_are_cleared() {
        let mut locked = sample_record("op1");
        locked.locked = true;
        let mut db = Database::default();
        db.flights.insert("f1".into(), Some(locked));
        db.flights.insert("f2".into(), Some(sample_record("op2")));
        db.flights.insert("pending".into(), None);

        assert_eq!(db.release_stale_locks(), 2);
        assert_eq!(db.flights.len(), 2);
        assert!(db.flights.values().flatten().all(|r| !r.locked));
        assert_eq!(db.flight_for_intent("op1").map(|(id, _)| id), Some("f1"));
    }

    #[test]
    fn cache_never_goes_back_a_version() {
        let mut db = Database::default();
        let mut newer = sample_record("op1").op_intent;
        newer.reference.version = 3;
        let mut older = newer.clone();
        older.reference.version = 1;

        assert!(db.cache_if_newer(newer));
        assert!(!db.cache_if_newer(older.clone()));
        assert_eq!(db.cached_operations["op1"].reference.version, 3);

        older.reference.version = 4;
        assert!(db.cache_if_newer(older));
        assert_eq!(db.cached_operations["op1"].reference.version, 4);
    }
}
