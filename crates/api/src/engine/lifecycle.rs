//! Cancellation, bulk clearing, and stale-job recovery.
//!
//! The external worker owns `pending -> processing -> {completed, failed}`.
//! This module owns `cancelled` and the removal of queued jobs. Nothing here
//! takes a lock: two concurrent cancels of the same job both run, and the
//! record-level deletes make the second one find nothing left.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kbase_core::error::CoreError;
use kbase_core::import_job::{
    cancellation_message, stale_failure_message, CancelOutcome, ClearOutcome, ClearQueueOutcome,
    CompensationStrategy, ImportJob, ImportJobStatus,
};
use kbase_core::stores::{EntryStore, JobStore, ObjectStore};
use kbase_core::types::DbId;

use super::store_failure;

pub struct JobLifecycle {
    jobs: Arc<dyn JobStore>,
    entries: Arc<dyn EntryStore>,
    objects: Arc<dyn ObjectStore>,
    compensation: CompensationStrategy,
}

impl JobLifecycle {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        entries: Arc<dyn EntryStore>,
        objects: Arc<dyn ObjectStore>,
        compensation: CompensationStrategy,
    ) -> Self {
        Self {
            jobs,
            entries,
            objects,
            compensation,
        }
    }

    // -----------------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------------

    /// Cancel a job and delete the entries it produced.
    ///
    /// Entries go first, then the job moves to `cancelled` with a message
    /// carrying the count. A job that is already cancelled is left alone
    /// and reports `deleted_count = 0`. Completed and failed jobs are
    /// terminal and yield `Conflict`.
    pub async fn cancel_job(&self, job_id: DbId) -> Result<CancelOutcome, CoreError> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(store_failure("cancel_job", Some(job_id)))?
            .ok_or(CoreError::NotFound {
                entity: "ImportJob",
                id: job_id,
            })?;

        match job.status {
            ImportJobStatus::Cancelled => {
                tracing::info!(job_id, "Cancel requested for already-cancelled job");
                return Ok(outcome(&job, 0));
            }
            ImportJobStatus::Completed | ImportJobStatus::Failed => {
                return Err(already_finished(&job));
            }
            ImportJobStatus::Pending | ImportJobStatus::Processing => {}
        }

        let deleted = self.compensate(&job).await?;
        let message = cancellation_message(deleted);

        let updated = self
            .jobs
            .transition(
                job.id,
                &ImportJobStatus::allowed_sources(ImportJobStatus::Cancelled),
                ImportJobStatus::Cancelled,
                Some(&message),
            )
            .await
            .map_err(store_failure("cancel_job", Some(job_id)))?;

        if updated.is_some() {
            tracing::info!(
                job_id,
                filename = %job.filename,
                deleted,
                strategy = ?self.compensation,
                "Import job cancelled",
            );
            return Ok(outcome(&job, deleted));
        }

        // The status moved between the read and the guarded update.
        let current = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(store_failure("cancel_job", Some(job_id)))?;
        match current {
            Some(j) if j.status == ImportJobStatus::Cancelled => Ok(outcome(&job, deleted)),
            Some(j) => {
                tracing::warn!(
                    job_id,
                    status = %j.status,
                    deleted,
                    "Job finished while being cancelled; produced entries were already removed",
                );
                Err(already_finished(&j))
            }
            None => Err(CoreError::NotFound {
                entity: "ImportJob",
                id: job_id,
            }),
        }
    }

    async fn compensate(&self, job: &ImportJob) -> Result<u64, CoreError> {
        let result = match self.compensation {
            CompensationStrategy::Watermark => {
                self.entries.delete_created_since(job.created_at).await
            }
            CompensationStrategy::Attributed => self.entries.delete_produced_by(job.id).await,
        };
        result.map_err(store_failure("cancel_job", Some(job.id)))
    }

    // -----------------------------------------------------------------------
    // Clear
    // -----------------------------------------------------------------------

    /// Delete every pending or processing job and, best effort, its file.
    ///
    /// Object-store failures are logged and counted per file in
    /// `failed_files`; the job rows are deleted regardless. Job-store
    /// failures abort the call.
    pub async fn clear_pending_jobs(&self) -> Result<ClearOutcome, CoreError> {
        let queued = self
            .jobs
            .list_by_statuses(&ImportJobStatus::ACTIVE)
            .await
            .map_err(store_failure("clear_pending_jobs", None))?;

        if queued.is_empty() {
            return Ok(ClearOutcome::default());
        }

        let refs: Vec<String> = queued.iter().map(|j| j.file_ref.clone()).collect();
        let (deleted_files, failed_files) = match self.objects.delete_many(&refs).await {
            Ok(tally) => {
                if tally.failed > 0 {
                    tracing::warn!(
                        failed = tally.failed,
                        "Some files could not be deleted; objects left for reconciliation",
                    );
                }
                (tally.deleted, tally.failed)
            }
            Err(e) => {
                tracing::warn!(
                    files = refs.len(),
                    error = %e,
                    "File cleanup failed; objects left for reconciliation",
                );
                (0, refs.len() as u64)
            }
        };

        let ids: Vec<DbId> = queued.iter().map(|j| j.id).collect();
        let deleted_jobs = self
            .jobs
            .delete_many(&ids)
            .await
            .map_err(store_failure("clear_pending_jobs", None))?;

        tracing::info!(deleted_jobs, deleted_files, failed_files, "Cleared pending imports");
        Ok(ClearOutcome {
            deleted_jobs,
            deleted_files,
            failed_files,
        })
    }

    /// Delete every pending or processing job row. Never touches storage.
    pub async fn clear_queue_only(&self) -> Result<ClearQueueOutcome, CoreError> {
        let deleted_jobs = self
            .jobs
            .delete_by_statuses(&ImportJobStatus::ACTIVE)
            .await
            .map_err(store_failure("clear_queue_only", None))?;

        tracing::info!(deleted_jobs, "Cleared import queue (files kept)");
        Ok(ClearQueueOutcome { deleted_jobs })
    }

    // -----------------------------------------------------------------------
    // Stale jobs
    // -----------------------------------------------------------------------

    /// Fail `processing` jobs that have not moved for `timeout`.
    pub async fn fail_stale_jobs(&self, timeout: Duration) -> Result<u64, CoreError> {
        let age = chrono::Duration::from_std(timeout)
            .map_err(|e| CoreError::Internal(format!("Stale timeout out of range: {e}")))?;
        let cutoff = Utc::now() - age;
        self.jobs
            .fail_stale_processing(cutoff, &stale_failure_message(timeout.as_secs()))
            .await
            .map_err(store_failure("fail_stale_jobs", None))
    }
}

fn outcome(job: &ImportJob, deleted_count: u64) -> CancelOutcome {
    CancelOutcome {
        deleted_count,
        job_id: job.id,
        filename: job.filename.clone(),
    }
}

fn already_finished(job: &ImportJob) -> CoreError {
    CoreError::Conflict(format!(
        "Import job {} is already {} and cannot be cancelled",
        job.id, job.status
    ))
}
