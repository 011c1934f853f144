//! Read-only view of import jobs for polling clients.

use std::sync::Arc;

use kbase_core::error::CoreError;
use kbase_core::import_job::ImportJob;
use kbase_core::stores::JobStore;
use kbase_core::types::DbId;

use super::store_failure;

pub struct StatusReporter {
    jobs: Arc<dyn JobStore>,
}

impl StatusReporter {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// Full snapshot of every job, oldest first.
    pub async fn list_jobs(&self) -> Result<Vec<ImportJob>, CoreError> {
        self.jobs
            .list_all()
            .await
            .map_err(store_failure("list_jobs", None))
    }

    pub async fn get_job(&self, job_id: DbId) -> Result<ImportJob, CoreError> {
        self.jobs
            .find_by_id(job_id)
            .await
            .map_err(store_failure("get_job", Some(job_id)))?
            .ok_or(CoreError::NotFound {
                entity: "ImportJob",
                id: job_id,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use kbase_core::import_job::{ImportJobStatus, NewImportJob};
    use kbase_core::memory::MemoryJobStore;

    #[tokio::test]
    async fn lists_oldest_first_and_reflects_transitions() {
        let store = Arc::new(MemoryJobStore::new());
        let reporter = StatusReporter::new(store.clone());
        let mut ids = Vec::new();
        for name in ["a.txt", "b.txt", "c.txt"] {
            let job = store
                .insert(&NewImportJob {
                    filename: name.into(),
                    file_ref: format!("imports/{name}"),
                })
                .await
                .unwrap();
            ids.push(job.id);
        }
        store
            .transition(ids[1], &[ImportJobStatus::Pending], ImportJobStatus::Processing, None)
            .await
            .unwrap();

        let jobs = reporter.list_jobs().await.unwrap();

        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), ids);
        assert_eq!(jobs[1].status, ImportJobStatus::Processing);
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let reporter = StatusReporter::new(Arc::new(MemoryJobStore::new()));
        assert!(reporter.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let reporter = StatusReporter::new(Arc::new(MemoryJobStore::new()));
        assert_matches!(
            reporter.get_job(9).await,
            Err(CoreError::NotFound { entity: "ImportJob", id: 9 })
        );
    }
}
