//! Persistence contract for versioned records.
//!
//! The concurrency guard needs exactly two things from storage: read by id,
//! and a conditional write that succeeds only while the stored version still
//! equals the caller's, bumping it by one atomically. Handlers also insert
//! new records through the same trait.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use thiserror::Error;

/// A record carrying an optimistic-concurrency version stamp.
pub trait Versioned {
    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("version mismatch: expected {expected}, stored {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage that can read records and write them conditionally.
pub trait VersionedStore: Send + Sync + 'static {
    type Record: Versioned + Clone + Send + Sync + 'static;

    /// Store a new record, assigning its id and version 1.
    fn insert(
        &self,
        record: Self::Record,
    ) -> impl Future<Output = Result<Self::Record, StoreError>> + Send;

    fn get(&self, id: i64) -> impl Future<Output = Result<Self::Record, StoreError>> + Send;

    /// Replace the stored record with `record` if its stored version equals
    /// `expected`. On success the stored version is `expected + 1` and the
    /// stored record is returned.
    fn update_if_version(
        &self,
        record: Self::Record,
        expected: u32,
    ) -> impl Future<Output = Result<Self::Record, StoreError>> + Send;
}

/// In-process store keyed by id.
///
/// The compare-and-increment runs under the map's per-shard write lock, so
/// it is atomic against every other writer of the same id.
#[derive(Debug)]
pub struct MemoryStore<R> {
    records: DashMap<i64, R>,
    next_id: AtomicI64,
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl<R> MemoryStore<R>
where
    R: Versioned + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn remove(&self, id: i64) -> Option<R> {
        self.records.remove(&id).map(|(_, record)| record)
    }
}

impl<R> VersionedStore for MemoryStore<R>
where
    R: Versioned + Clone + Send + Sync + 'static,
{
    type Record = R;

    async fn insert(&self, mut record: R) -> Result<R, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        record.set_id(id);
        record.set_version(1);
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<R, StoreError> {
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update_if_version(&self, mut record: R, expected: u32) -> Result<R, StoreError> {
        let mut slot = self
            .records
            .get_mut(&record.id())
            .ok_or(StoreError::NotFound)?;

        let actual = slot.version();
        if actual != expected {
            return Err(StoreError::VersionMismatch { expected, actual });
        }

        record.set_version(expected + 1);
        *slot = record.clone();
        Ok(record)
    }
}
