//! Import engine.
//!
//! Ingestion validates and stores uploads and writes one job per accepted
//! file. The lifecycle manager owns cancellation, bulk clearing, and the
//! stale-job sweep. The status reporter is the read-only projection polled
//! by clients. All three work against the store traits from
//! `kbase_core::stores` and hold no state of their own between requests.

pub mod ingestion;
pub mod lifecycle;
pub mod status;

use std::sync::Arc;

use kbase_core::error::CoreError;
use kbase_core::stores::{EntryStore, JobStore, ObjectStore, StoreError};
use kbase_core::types::DbId;

use crate::config::ImportConfig;

pub use ingestion::{JobIngestion, UploadedFile};
pub use lifecycle::JobLifecycle;
pub use status::StatusReporter;

/// External stores the engine talks to.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub entries: Arc<dyn EntryStore>,
    pub objects: Arc<dyn ObjectStore>,
}

/// Ingestion, lifecycle, and status reporting wired to one set of stores.
pub struct ImportEngine {
    pub ingestion: JobIngestion,
    pub lifecycle: JobLifecycle,
    pub status: StatusReporter,
}

impl ImportEngine {
    pub fn new(stores: Stores, config: &ImportConfig) -> Self {
        Self {
            ingestion: JobIngestion::new(
                Arc::clone(&stores.jobs),
                Arc::clone(&stores.objects),
                config,
            ),
            lifecycle: JobLifecycle::new(
                Arc::clone(&stores.jobs),
                Arc::clone(&stores.entries),
                Arc::clone(&stores.objects),
                config.compensation,
            ),
            status: StatusReporter::new(stores.jobs),
        }
    }
}

/// Log a store failure with the operation it broke, then lift it into a
/// [`CoreError::Dependency`].
pub(crate) fn store_failure(
    operation: &'static str,
    job_id: Option<DbId>,
) -> impl FnOnce(StoreError) -> CoreError {
    move |err| {
        tracing::error!(operation, ?job_id, store = err.store(), error = %err, "Store call failed");
        CoreError::from(err)
    }
}
