//! Byte backends holding the published state.
//!
//! The store itself only ever hands whole encoded snapshots to a backend.
//! [`MemoryBackend`] keeps them in process; [`RocksBackend`] (feature
//! `rocksdb`) keeps them on disk so a restarted node finds its last commit.

use std::sync::{Arc, RwLock};

use crate::error::Result;

/// Storage for the latest committed snapshot.
pub trait Backend: Send + Sync {
    /// Load the latest published snapshot, if any.
    fn load(&self) -> Result<Option<Arc<[u8]>>>;

    /// Publish a new snapshot, replacing the previous one.
    fn store(&self, bytes: &[u8]) -> Result<()>;
}

/// In-process backend. Readers clone an `Arc` and decode outside the lock.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    published: RwLock<Option<Arc<[u8]>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn load(&self) -> Result<Option<Arc<[u8]>>> {
        let published = self
            .published
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(published.clone())
    }

    fn store(&self, bytes: &[u8]) -> Result<()> {
        let mut published = self
            .published
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *published = Some(Arc::from(bytes));
        Ok(())
    }
}

/// RocksDB-backed snapshot storage.
#[cfg(feature = "rocksdb")]
pub struct RocksBackend {
    db: rocksdb::DB,
    key: Vec<u8>,
}

#[cfg(feature = "rocksdb")]
impl RocksBackend {
    /// Open or create a database at `path`, storing the snapshot under `key`.
    pub fn open<P: AsRef<std::path::Path>>(path: P, key: &str) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = rocksdb::DB::open(&opts, path)?;
        Ok(Self {
            db,
            key: format!("state:{}", key).into_bytes(),
        })
    }
}

#[cfg(feature = "rocksdb")]
impl Backend for RocksBackend {
    fn load(&self) -> Result<Option<Arc<[u8]>>> {
        Ok(self.db.get(&self.key)?.map(Arc::from))
    }

    fn store(&self, bytes: &[u8]) -> Result<()> {
        self.db.put(&self.key, bytes)?;
        Ok(())
    }
}
