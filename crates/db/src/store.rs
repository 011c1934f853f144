//! PostgreSQL-backed implementations of the core store traits.

use async_trait::async_trait;
use kbase_core::import_job::{ImportJob, ImportJobStatus, NewImportJob};
use kbase_core::stores::{EntryStore, JobStore, StoreError};
use kbase_core::types::{DbId, Timestamp};

use crate::models::import_job::ImportJobRow;
use crate::repositories::{EntryRepo, ImportJobRepo};
use crate::DbPool;

const JOB_STORE: &str = "job_store";
const ENTRY_STORE: &str = "entry_store";

fn status_names(statuses: &[ImportJobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn lift_all(rows: Vec<ImportJobRow>) -> Result<Vec<ImportJob>, StoreError> {
    rows.into_iter().map(ImportJob::try_from).collect()
}

/// [`JobStore`] over the `import_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &NewImportJob) -> Result<ImportJob, StoreError> {
        let row = ImportJobRepo::create(&self.pool, &job.filename, &job.file_ref)
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))?;
        row.try_into()
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<ImportJob>, StoreError> {
        ImportJobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))?
            .map(ImportJob::try_from)
            .transpose()
    }

    async fn list_all(&self) -> Result<Vec<ImportJob>, StoreError> {
        let rows = ImportJobRepo::list_all(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))?;
        lift_all(rows)
    }

    async fn list_by_statuses(
        &self,
        statuses: &[ImportJobStatus],
    ) -> Result<Vec<ImportJob>, StoreError> {
        let rows = ImportJobRepo::list_by_statuses(&self.pool, &status_names(statuses))
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))?;
        lift_all(rows)
    }

    async fn transition(
        &self,
        id: DbId,
        from: &[ImportJobStatus],
        to: ImportJobStatus,
        error_message: Option<&str>,
    ) -> Result<Option<ImportJob>, StoreError> {
        ImportJobRepo::transition(&self.pool, id, &status_names(from), to.as_str(), error_message)
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))?
            .map(ImportJob::try_from)
            .transpose()
    }

    async fn delete_many(&self, ids: &[DbId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        ImportJobRepo::delete_many(&self.pool, ids)
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))
    }

    async fn delete_by_statuses(&self, statuses: &[ImportJobStatus]) -> Result<u64, StoreError> {
        ImportJobRepo::delete_by_statuses(&self.pool, &status_names(statuses))
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))
    }

    async fn fail_stale_processing(
        &self,
        cutoff: Timestamp,
        error_message: &str,
    ) -> Result<u64, StoreError> {
        ImportJobRepo::fail_stale_processing(&self.pool, cutoff, error_message)
            .await
            .map_err(|e| StoreError::unavailable(JOB_STORE, e))
    }
}

/// [`EntryStore`] over the `kb_entries` table.
#[derive(Clone)]
pub struct PgEntryStore {
    pool: DbPool,
}

impl PgEntryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntryStore for PgEntryStore {
    async fn delete_created_since(&self, watermark: Timestamp) -> Result<u64, StoreError> {
        EntryRepo::delete_created_since(&self.pool, watermark)
            .await
            .map_err(|e| StoreError::unavailable(ENTRY_STORE, e))
    }

    async fn delete_produced_by(&self, job_id: DbId) -> Result<u64, StoreError> {
        EntryRepo::delete_produced_by(&self.pool, job_id)
            .await
            .map_err(|e| StoreError::unavailable(ENTRY_STORE, e))
    }
}
