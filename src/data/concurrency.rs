//! Optimistic concurrency control for versioned records.
//!
//! The handler reads a record, computes a new state, and commits it with the
//! version it read. No lock is held between the read and the commit; the
//! store's conditional write decides the race. Exactly one of any group of
//! writers starting from the same version wins.

use std::sync::Arc;

use thiserror::Error;

use crate::data::store::{StoreError, Versioned, VersionedStore};
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// Another writer won, or the client's asserted version is stale.
    #[error("edit conflict on record {id}: expected version {expected}")]
    EditConflict {
        id: i64,
        expected: u32,
        current: Option<u32>,
    },

    #[error("record {0} not found")]
    NotFound(i64),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl WriteError {
    fn from_store(id: i64, err: StoreError) -> Self {
        match err {
            StoreError::NotFound => WriteError::NotFound(id),
            StoreError::VersionMismatch { expected, actual } => WriteError::EditConflict {
                id,
                expected,
                current: Some(actual),
            },
            StoreError::Unavailable(detail) => WriteError::Storage(detail),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteError::EditConflict { .. })
    }
}

/// Wraps a [`VersionedStore`] and classifies conditional-write outcomes.
#[derive(Debug)]
pub struct OptimisticGuard<S> {
    store: Arc<S>,
}

impl<S> Clone for OptimisticGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: VersionedStore> OptimisticGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create(&self, record: S::Record) -> Result<S::Record, WriteError> {
        self.store
            .insert(record)
            .await
            .map_err(|e| WriteError::from_store(0, e))
    }

    pub async fn read(&self, id: i64) -> Result<S::Record, WriteError> {
        self.store
            .get(id)
            .await
            .map_err(|e| WriteError::from_store(id, e))
    }

    /// Commit `candidate`, computed from a read at `read_version`.
    ///
    /// `asserted` is the version the client claims to have seen. If it
    /// differs from `read_version` the write is refused before storage is
    /// touched.
    pub async fn commit(
        &self,
        read_version: u32,
        candidate: S::Record,
        asserted: Option<u32>,
    ) -> Result<S::Record, WriteError> {
        let id = candidate.id();

        if let Some(asserted) = asserted {
            if asserted != read_version {
                metrics::record_edit_conflict("asserted");
                tracing::debug!(id, asserted, current = read_version, "Stale client version");
                return Err(WriteError::EditConflict {
                    id,
                    expected: asserted,
                    current: Some(read_version),
                });
            }
        }

        match self.store.update_if_version(candidate, read_version).await {
            Ok(stored) => {
                debug_assert_eq!(stored.version(), read_version + 1);
                Ok(stored)
            }
            Err(e) => {
                let err = WriteError::from_store(id, e);
                if err.is_conflict() {
                    metrics::record_edit_conflict("concurrent");
                    tracing::debug!(id, expected = read_version, "Lost write race");
                }
                Err(err)
            }
        }
    }

    /// Read, apply, commit once.
    pub async fn update<F>(
        &self,
        id: i64,
        asserted: Option<u32>,
        apply: F,
    ) -> Result<S::Record, WriteError>
    where
        F: FnOnce(&mut S::Record),
    {
        let mut record = self.read(id).await?;
        let read_version = record.version();
        apply(&mut record);
        self.commit(read_version, record, asserted).await
    }

    /// Read, apply, commit; on a lost race re-read and re-apply, up to
    /// `max_attempts` commits in total.
    ///
    /// There is no asserted version here: a client assertion that is stale
    /// once stays stale however often the server retries.
    pub async fn update_with_retry<F>(
        &self,
        id: i64,
        max_attempts: u32,
        mut apply: F,
    ) -> Result<S::Record, WriteError>
    where
        F: FnMut(&mut S::Record),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut record = self.read(id).await?;
            let read_version = record.version();
            apply(&mut record);

            match self.commit(read_version, record, None).await {
                Err(err) if err.is_conflict() && attempt < max_attempts => {
                    tracing::debug!(id, attempt, "Retrying after edit conflict");
                }
                result => return result,
            }
        }
    }
}
