//! Interfaces to the external stores the importer depends on.
//!
//! Authoritative state lives outside the process: job rows and knowledge-base
//! entries in the relational store, file bytes in object storage. The
//! adapters in `kbase-db` and `kbase-cloud` implement these traits; the
//! in-memory versions in [`crate::memory`] back tests and local development.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::import_job::{ImportJob, ImportJobStatus, NewImportJob};
use crate::types::{DbId, Timestamp};

/// Failure talking to an external store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the operation.
    #[error("{store} unavailable: {message}")]
    Unavailable {
        store: &'static str,
        message: String,
    },

    /// The store answered with something we cannot interpret.
    #[error("{store} returned an invalid response: {message}")]
    InvalidResponse {
        store: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn unavailable(store: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            store,
            message: err.to_string(),
        }
    }

    pub fn store(&self) -> &'static str {
        match self {
            Self::Unavailable { store, .. } | Self::InvalidResponse { store, .. } => store,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Dependency {
            service: err.store(),
            message: err.to_string(),
        }
    }
}

/// Durable table of import jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a `pending` job; the store assigns `id` and both timestamps.
    async fn insert(&self, job: &NewImportJob) -> Result<ImportJob, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<ImportJob>, StoreError>;

    /// Every job, ascending by `created_at` (ties broken by `id`).
    async fn list_all(&self) -> Result<Vec<ImportJob>, StoreError>;

    /// Jobs whose status is in `statuses`, ascending by `created_at`.
    async fn list_by_statuses(
        &self,
        statuses: &[ImportJobStatus],
    ) -> Result<Vec<ImportJob>, StoreError>;

    /// Compare-and-set status update.
    ///
    /// Moves the job to `to` only if its current status is one of `from`,
    /// bumping `updated_at` and replacing `error_message`. Returns the updated
    /// row, or `None` when the job is missing or its status did not match.
    async fn transition(
        &self,
        id: DbId,
        from: &[ImportJobStatus],
        to: ImportJobStatus,
        error_message: Option<&str>,
    ) -> Result<Option<ImportJob>, StoreError>;

    /// Delete the given rows. Returns how many existed.
    async fn delete_many(&self, ids: &[DbId]) -> Result<u64, StoreError>;

    /// Delete every job whose status is in `statuses`.
    async fn delete_by_statuses(&self, statuses: &[ImportJobStatus]) -> Result<u64, StoreError>;

    /// Fail every `processing` job whose `updated_at` is older than `cutoff`.
    async fn fail_stale_processing(
        &self,
        cutoff: Timestamp,
        error_message: &str,
    ) -> Result<u64, StoreError>;
}

/// Knowledge-base entries written by the import worker.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Delete every entry with `created_at >= watermark`.
    async fn delete_created_since(&self, watermark: Timestamp) -> Result<u64, StoreError>;

    /// Delete every entry attributed to `job_id`.
    async fn delete_produced_by(&self, job_id: DbId) -> Result<u64, StoreError>;
}

/// Reference returned by an object store after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Store-relative path; this is what gets persisted.
    pub path: String,
    /// Publicly resolvable URL for the object.
    pub public_url: String,
}

/// Tally of a bulk object delete.
///
/// Paths that were already absent count as neither deleted nor failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectDeletion {
    pub deleted: u64,
    pub failed: u64,
}

/// Blob storage for uploaded files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StoreError>;

    /// Delete the objects at `paths`.
    ///
    /// A failure on one object is counted in [`ObjectDeletion::failed`] and
    /// the remaining paths are still attempted. `Err` is reserved for the
    /// store itself being unreachable before anything was removed.
    async fn delete_many(&self, paths: &[String]) -> Result<ObjectDeletion, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn store_error_maps_to_dependency() {
        let err = StoreError::unavailable("object_store", "connection refused");
        assert_matches!(
            CoreError::from(err),
            CoreError::Dependency { service: "object_store", .. }
        );
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::InvalidResponse {
            store: "counter_store",
            message: "short reply".into(),
        };
        assert_eq!(
            err.to_string(),
            "counter_store returned an invalid response: short reply"
        );
    }
}
