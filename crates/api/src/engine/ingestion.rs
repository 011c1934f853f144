//! Bulk upload of import files.

use std::sync::Arc;

use kbase_core::error::CoreError;
use kbase_core::import_job::{
    storage_path_for, validate_extension, validate_public_url, validate_size, FileOutcome,
    ImportJob, NewImportJob,
};
use kbase_core::stores::{JobStore, ObjectStore};

use crate::config::ImportConfig;

/// Generic failure text shown to clients; the store error itself is logged.
const UPLOAD_FAILED: &str = "Upload failed; please retry";
const RECORD_FAILED: &str = "Could not record the import job; please retry";

/// One file from a multipart submission.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Stores accepted uploads and creates their `pending` jobs.
pub struct JobIngestion {
    jobs: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    allowed_extension: String,
    max_file_bytes: usize,
}

impl JobIngestion {
    pub fn new(jobs: Arc<dyn JobStore>, objects: Arc<dyn ObjectStore>, config: &ImportConfig) -> Self {
        Self {
            jobs,
            objects,
            allowed_extension: config.allowed_extension.clone(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    /// Accept a batch of files.
    ///
    /// Each file is handled on its own: a rejected or failed file is
    /// reported in its outcome entry and never undoes files already
    /// committed. Fails with `Validation` only when the batch is empty or
    /// every file was rejected by the upload rules.
    pub async fn submit(&self, files: Vec<UploadedFile>) -> Result<Vec<FileOutcome>, CoreError> {
        if files.is_empty() {
            return Err(CoreError::Validation("No files were uploaded".into()));
        }

        let mut outcomes = Vec::with_capacity(files.len());
        let mut eligible = 0usize;

        for file in files {
            if let Err(e) = self.check_rules(&file) {
                tracing::debug!(filename = %file.filename, "Rejected upload");
                outcomes.push(FileOutcome::error(file.filename, validation_detail(e)));
                continue;
            }
            eligible += 1;

            let filename = file.filename.clone();
            match self.store_one(file).await {
                Ok(job) => outcomes.push(FileOutcome::accepted(filename, job.id)),
                Err(detail) => outcomes.push(FileOutcome::error(filename, detail)),
            }
        }

        if eligible == 0 {
            return Err(CoreError::Validation(format!(
                "No files accepted: only non-empty {} files up to {} bytes can be imported",
                self.allowed_extension, self.max_file_bytes
            )));
        }

        Ok(outcomes)
    }

    fn check_rules(&self, file: &UploadedFile) -> Result<(), CoreError> {
        validate_extension(&file.filename, &self.allowed_extension)?;
        validate_size(file.bytes.len(), self.max_file_bytes)
    }

    /// Upload one file under a fresh path and insert its job row. On
    /// failure, returns the detail to report for this file.
    async fn store_one(&self, file: UploadedFile) -> Result<ImportJob, String> {
        let path = storage_path_for(&file.filename);
        let content_type = file
            .content_type
            .as_deref()
            .unwrap_or("text/plain; charset=utf-8");

        let stored = self
            .objects
            .put(&path, file.bytes, content_type)
            .await
            .map_err(|e| {
                tracing::error!(filename = %file.filename, path = %path, error = %e, "Upload to object store failed");
                UPLOAD_FAILED.to_string()
            })?;

        if let Err(e) = validate_public_url(&stored.public_url, &stored.path) {
            tracing::error!(
                filename = %file.filename,
                path = %stored.path,
                public_url = %stored.public_url,
                error = %e,
                "Object store returned an unusable reference",
            );
            self.discard(&stored.path).await;
            return Err("Storage returned an invalid file reference".to_string());
        }

        let inserted = self
            .jobs
            .insert(&NewImportJob {
                filename: file.filename.clone(),
                file_ref: stored.path.clone(),
            })
            .await;
        let job = match inserted {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(filename = %file.filename, error = %e, "Failed to insert import job");
                self.discard(&stored.path).await;
                return Err(RECORD_FAILED.to_string());
            }
        };

        tracing::info!(job_id = job.id, filename = %job.filename, file_ref = %job.file_ref, "Import job queued");
        Ok(job)
    }

    /// Remove an upload that no job will reference.
    async fn discard(&self, path: &str) {
        match self.objects.delete_many(&[path.to_string()]).await {
            Ok(tally) if tally.failed == 0 => {}
            Ok(_) => tracing::warn!(path, "Could not remove unreferenced upload"),
            Err(e) => tracing::warn!(path, error = %e, "Could not remove unreferenced upload"),
        }
    }
}

fn validation_detail(err: CoreError) -> String {
    match err {
        CoreError::Validation(msg) => msg,
        other => other.to_string(),
    }
}
