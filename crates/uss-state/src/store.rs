//! The transactional shared state store.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{error, trace};

use crate::backend::{Backend, MemoryBackend};
use crate::codec::{Codec, JsonCodec};
use crate::error::{Result, StoreError};

/// Default capacity for a published snapshot (16 MiB).
pub const DEFAULT_CAPACITY: usize = 16 * 1024 * 1024;

/// A single value shared by every worker, mutable only inside a transaction.
///
/// Readers decode the last published snapshot and never block writers.
/// Writers take an exclusive lock, mutate a private decoded copy and publish
/// it on [`Transaction::commit`]. Dropping a transaction without committing
/// discards every change.
pub struct SharedState<T, C = JsonCodec>
where
    C: Codec<T>,
{
    name: String,
    codec: C,
    backend: Box<dyn Backend>,
    capacity: usize,
    writer: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
    _value: PhantomData<fn() -> T>,
}

impl<T> SharedState<T, JsonCodec>
where
    T: Default + serde::Serialize + serde::de::DeserializeOwned,
{
    /// In-memory JSON-encoded state with the default capacity.
    pub fn in_memory(name: impl Into<String>) -> Result<Self> {
        Self::open(name, JsonCodec, MemoryBackend::new(), DEFAULT_CAPACITY)
    }
}

impl<T, C> SharedState<T, C>
where
    T: Default,
    C: Codec<T>,
{
    /// Open a store over `backend`, publishing `T::default()` if it holds nothing yet.
    pub fn open(
        name: impl Into<String>,
        codec: C,
        backend: impl Backend + 'static,
        capacity: usize,
    ) -> Result<Self> {
        let store = Self {
            name: name.into(),
            codec,
            backend: Box::new(backend),
            capacity,
            writer: Mutex::new(()),
            owner: Mutex::new(None),
            _value: PhantomData,
        };
        if store.backend.load()?.is_none() {
            store.publish(&T::default())?;
        }
        Ok(store)
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point-in-time snapshot of the last committed value.
    pub fn read(&self) -> Result<T> {
        match self.backend.load()? {
            Some(bytes) => self.codec.decode(&bytes),
            None => Ok(T::default()),
        }
    }

    /// Begin an exclusive transaction.
    ///
    /// Blocks until every other transaction on this store has finished. Fails
    /// with [`StoreError::Reentrant`] if the calling thread already holds one,
    /// since waiting would never end.
    pub fn transact(&self) -> Result<Transaction<'_, T, C>> {
        let me = thread::current().id();
        if *self.owner_slot() == Some(me) {
            return Err(StoreError::Reentrant(self.name.clone()));
        }

        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner_slot() = Some(me);
        trace!(store = %self.name, "transaction opened");

        match self.read() {
            Ok(value) => Ok(Transaction {
                store: self,
                value,
                _guard: guard,
            }),
            Err(e) => {
                *self.owner_slot() = None;
                Err(e)
            }
        }
    }

    /// Run `f` inside a transaction, committing on `Ok` and discarding on `Err`.
    pub fn update<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut T) -> std::result::Result<R, E>,
        E: From<StoreError>,
    {
        let mut tx = self.transact()?;
        let result = f(&mut tx.value)?;
        tx.commit()?;
        Ok(result)
    }

    fn owner_slot(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        if bytes.len() > self.capacity {
            error!(
                store = %self.name,
                size = bytes.len(),
                capacity = self.capacity,
                "refusing to publish state larger than capacity"
            );
            return Err(StoreError::CapacityExceeded {
                name: self.name.clone(),
                size: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.backend.store(&bytes)
    }
}

/// Exclusive, scoped access to a [`SharedState`] value.
pub struct Transaction<'a, T, C>
where
    T: Default,
    C: Codec<T>,
{
    store: &'a SharedState<T, C>,
    value: T,
    _guard: MutexGuard<'a, ()>,
}

impl<T, C> Transaction<'_, T, C>
where
    T: Default,
    C: Codec<T>,
{
    /// Publish the mutated value and end the transaction.
    pub fn commit(self) -> Result<()> {
        self.store.publish(&self.value)?;
        trace!(store = %self.store.name, "transaction committed");
        Ok(())
    }

    /// Discard every change made in this transaction.
    pub fn abort(self) {
        trace!(store = %self.store.name, "transaction aborted");
    }
}

impl<T, C> Deref for Transaction<'_, T, C>
where
    T: Default,
    C: Codec<T>,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, C> DerefMut for Transaction<'_, T, C>
where
    T: Default,
    C: Codec<T>,
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, C> Drop for Transaction<'_, T, C>
where
    T: Default,
    C: Codec<T>,
{
    fn drop(&mut self) {
        *self.store.owner_slot() = None;
    }
}
