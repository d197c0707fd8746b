//! Per-flight locking over the flight record store.
//!
//! Waiting is poll-and-backoff against the shared store with a bounded
//! deadline, so a holder that never lets go surfaces as [`Error::Deadlock`]
//! instead of a hang. Distinct flight ids never contend.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error};

use crate::database::{Database, FlightStore};
use crate::error::{Error, Result};
use crate::models::FlightRecord;

/// Timing for the polling waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Pause between attempts.
    pub backoff: Duration,
    /// Deadline for acquiring a flight lock.
    pub lock_timeout: Duration,
    /// Deadline for deleting a flight record.
    pub delete_timeout: Duration,
    /// Deadline for removing flights during an area clear.
    pub clear_area_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(500),
            lock_timeout: Duration::from_secs(60),
            delete_timeout: Duration::from_secs(60),
            clear_area_timeout: Duration::from_secs(5),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Use `timeout` for every kind of wait.
    #[must_use]
    pub fn with_timeouts(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self.delete_timeout = timeout;
        self.clear_area_timeout = timeout;
        self
    }
}

/// Lock, release and delete operations on individual flights.
pub struct FlightLocks {
    store: Arc<FlightStore>,
    config: LockConfig,
}

impl FlightLocks {
    pub fn new(store: Arc<FlightStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<FlightStore> {
        &self.store
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire exclusive use of `flight_id`.
    ///
    /// An unknown id is reserved with a placeholder and reported as a new
    /// flight. The lock is released when the returned guard drops.
    pub async fn lock(&self, flight_id: &str) -> Result<FlightLock> {
        let existing = self
            .poll("lock", flight_id, self.config.lock_timeout, |db| {
                match db.flights.get_mut(flight_id) {
                    None => {
                        db.flights.insert(flight_id.to_string(), None);
                        Some(None)
                    }
                    Some(Some(record)) if !record.locked => {
                        record.locked = true;
                        Some(Some(record.clone()))
                    }
                    Some(_) => None,
                }
            })
            .await?;

        debug!(flight_id, new = existing.is_none(), "flight locked");
        Ok(FlightLock {
            store: Arc::clone(&self.store),
            flight_id: flight_id.to_string(),
            existing,
        })
    }

    /// Remove the record for `flight_id` once nobody holds it.
    ///
    /// Returns `None` if no such flight exists.
    pub async fn delete(&self, flight_id: &str) -> Result<Option<FlightRecord>> {
        self.poll("delete", flight_id, self.config.delete_timeout, |db| {
            let removable = match db.flights.get(flight_id) {
                None => return Some(None),
                Some(Some(record)) => !record.locked,
                Some(None) => false,
            };
            if removable {
                db.flights.remove(flight_id)
            } else {
                None
            }
        })
        .await
    }

    /// Put back a record taken out by [`FlightLocks::delete`], unlocked.
    pub fn restore(&self, flight_id: &str, mut record: FlightRecord) -> Result<()> {
        record.locked = false;
        self.store.update(|db| {
            db.flights.insert(flight_id.to_string(), Some(record));
            Ok::<_, Error>(())
        })
    }

    /// Purge `op_intent_ids` from the peer cache, then drop every flight whose
    /// intent is among them. Waits for locked flights to be released; the
    /// cache purge stands even if that wait times out.
    ///
    /// Returns the removed flight ids.
    pub async fn remove_for_intents(&self, op_intent_ids: &BTreeSet<String>) -> Result<Vec<String>> {
        self.store.update(|db| {
            for id in op_intent_ids {
                db.cached_operations.remove(id);
            }
            Ok::<_, Error>(())
        })?;

        self.poll("clear area", "*", self.config.clear_area_timeout, |db| {
            let matching: Vec<String> = db
                .flights
                .iter()
                .filter_map(|(id, record)| match record {
                    Some(record) if op_intent_ids.contains(&record.op_intent.reference.id) => {
                        Some((id, record.locked))
                    }
                    _ => None,
                })
                .map(|(id, locked)| (!locked).then(|| id.clone()))
                .collect::<Option<Vec<_>>>()?;

            for id in &matching {
                db.flights.remove(id);
            }
            Some(matching)
        })
        .await
    }

    async fn poll<R>(
        &self,
        what: &str,
        flight_id: &str,
        timeout: Duration,
        mut attempt: impl FnMut(&mut Database) -> Option<R>,
    ) -> Result<R> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.try_once(&mut attempt)? {
                return Ok(result);
            }
            if Instant::now() >= deadline {
                return Err(Error::Deadlock(format!(
                    "timed out after {timeout:?} waiting to {what} flight {flight_id}"
                )));
            }
            tokio::time::sleep(self.config.backoff).await;
        }
    }

    fn try_once<R>(&self, attempt: &mut impl FnMut(&mut Database) -> Option<R>) -> Result<Option<R>> {
        let mut tx = self.store.transact()?;
        match attempt(&mut *tx) {
            Some(result) => {
                tx.commit()?;
                Ok(Some(result))
            }
            None => {
                tx.abort();
                Ok(None)
            }
        }
    }
}

/// Clear the lock on `flight_id`, or drop it entirely if it is only a placeholder.
pub fn release_flight(store: &FlightStore, flight_id: &str) -> Result<()> {
    store.update(|db| {
        match db.flights.get_mut(flight_id) {
            Some(Some(record)) => record.locked = false,
            Some(None) => {
                db.flights.remove(flight_id);
            }
            None => {}
        }
        Ok::<_, Error>(())
    })
}

/// Exclusive hold on one flight. Released on drop.
pub struct FlightLock {
    store: Arc<FlightStore>,
    flight_id: String,
    existing: Option<FlightRecord>,
}

impl FlightLock {
    pub fn flight_id(&self) -> &str {
        &self.flight_id
    }

    /// The record as it was when the lock was taken, `None` for a new flight.
    pub fn existing(&self) -> Option<&FlightRecord> {
        self.existing.as_ref()
    }

    pub fn is_new(&self) -> bool {
        self.existing.is_none()
    }

    /// Store `record` as this flight's record, still locked.
    pub fn save(&mut self, mut record: FlightRecord) -> Result<()> {
        record.locked = true;
        self.store.update(|db| {
            db.cached_operations.remove(&record.op_intent.reference.id);
            db.flights
                .insert(self.flight_id.clone(), Some(record.clone()));
            Ok::<_, Error>(())
        })?;
        self.existing = Some(record);
        Ok(())
    }
}

impl Drop for FlightLock {
    fn drop(&mut self) {
        match release_flight(&self.store, &self.flight_id) {
            Ok(()) => debug!(flight_id = %self.flight_id, "flight released"),
            Err(e) => error!(flight_id = %self.flight_id, error = %e, "failed to release flight"),
        }
    }
}
