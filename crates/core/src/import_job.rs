//! Import job lifecycle rules.
//!
//! An import job tracks one uploaded text file from submission until a
//! worker finishes with it (or a user cancels it). This module owns the
//! state machine, the upload naming rules, and the result shapes returned
//! by the ingestion and lifecycle operations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Extension accepted for uploaded import files.
pub const DEFAULT_ALLOWED_EXTENSION: &str = ".txt";

/// Default per-file upload cap (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Object-store prefix under which import uploads are written.
pub const STORAGE_PREFIX: &str = "imports";

/// Longest sanitized filename segment kept in a storage path.
const MAX_STORED_NAME_LEN: usize = 120;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an import job.
///
/// ```text
/// pending -> processing -> completed | failed
/// pending | processing  -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ImportJobStatus {
    /// Statuses a job can still leave.
    pub const ACTIVE: [ImportJobStatus; 2] = [Self::Pending, Self::Processing];

    /// Database / wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: ImportJobStatus) -> bool {
        use ImportJobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }

    /// Every status from which `target` may be entered.
    ///
    /// Stores use this as the guard set of a compare-and-set update so a
    /// concurrent writer cannot push a job backwards.
    pub fn allowed_sources(target: ImportJobStatus) -> Vec<ImportJobStatus> {
        ALL_STATUSES
            .into_iter()
            .filter(|from| from.can_transition_to(target))
            .collect()
    }
}

const ALL_STATUSES: [ImportJobStatus; 5] = [
    ImportJobStatus::Pending,
    ImportJobStatus::Processing,
    ImportJobStatus::Completed,
    ImportJobStatus::Failed,
    ImportJobStatus::Cancelled,
];

impl fmt::Display for ImportJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportJobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown import job status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// One import job as stored in the job table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportJob {
    pub id: DbId,
    pub filename: String,
    /// Object-store path of the uploaded bytes (never a full URL).
    pub file_ref: String,
    pub status: ImportJobStatus,
    /// Set once at insertion; the watermark for compensating deletes.
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub error_message: Option<String>,
}

/// Input for inserting a new job. New jobs always start `pending`.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub filename: String,
    pub file_ref: String,
}

/// How CancelJob decides which knowledge-base entries to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationStrategy {
    /// Delete every entry created at or after the job's `created_at`.
    ///
    /// Coarse: entries written for jobs submitted later are removed too.
    #[default]
    Watermark,
    /// Delete only entries whose `produced_by_job_id` is the cancelled job.
    Attributed,
}

impl FromStr for CompensationStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watermark" => Ok(Self::Watermark),
            "attributed" => Ok(Self::Attributed),
            other => Err(CoreError::Validation(format!(
                "Unknown compensation strategy '{other}'. Must be one of: watermark, attributed"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Per-file status in a submission response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOutcomeStatus {
    Pending,
    Error,
}

/// Result for one file of a submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub filename: String,
    pub status: FileOutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<DbId>,
}

impl FileOutcome {
    pub fn accepted(filename: impl Into<String>, job_id: DbId) -> Self {
        Self {
            filename: filename.into(),
            status: FileOutcomeStatus::Pending,
            detail: None,
            job_id: Some(job_id),
        }
    }

    pub fn error(filename: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: FileOutcomeStatus::Error,
            detail: Some(detail.into()),
            job_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub deleted_count: u64,
    pub job_id: DbId,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ClearOutcome {
    pub deleted_jobs: u64,
    pub deleted_files: u64,
    /// Files that could not be removed from object storage and are now orphaned.
    pub failed_files: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ClearQueueOutcome {
    pub deleted_jobs: u64,
}

// ---------------------------------------------------------------------------
// Upload rules
// ---------------------------------------------------------------------------

/// Check that `filename` ends with `extension` (ASCII case-insensitive).
pub fn validate_extension(filename: &str, extension: &str) -> Result<(), CoreError> {
    let name = filename.to_ascii_lowercase();
    let ext = extension.to_ascii_lowercase();
    if name.len() > ext.len() && name.ends_with(&ext) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported file type: only {extension} files are accepted"
        )))
    }
}

/// Check the upload size against the configured cap.
pub fn validate_size(len: usize, max_bytes: usize) -> Result<(), CoreError> {
    if len == 0 {
        return Err(CoreError::Validation("File is empty".into()));
    }
    if len > max_bytes {
        return Err(CoreError::Validation(format!(
            "File is {len} bytes; the limit is {max_bytes} bytes"
        )));
    }
    Ok(())
}

/// Build a fresh object-store path for an upload.
///
/// The path embeds a random v4 UUID so two uploads never share a name, plus
/// a sanitized copy of the original filename for operators browsing the
/// bucket.
pub fn storage_path_for(filename: &str) -> String {
    format!(
        "{STORAGE_PREFIX}/{}-{}",
        uuid::Uuid::new_v4(),
        sanitize_filename(filename)
    )
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_` and drop directories.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STORED_NAME_LEN)
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Check that an object store handed back a usable public reference for
/// `path`: an absolute http(s) URL with a host whose path ends in `path`.
pub fn validate_public_url(public_url: &str, path: &str) -> Result<(), CoreError> {
    let parsed = url::Url::parse(public_url)
        .map_err(|e| CoreError::Validation(format!("Malformed storage URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::Validation(format!(
            "Storage URL has unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Validation("Storage URL has no host".into()));
    }
    if !parsed.path().ends_with(path) {
        return Err(CoreError::Validation(
            "Storage URL does not point at the uploaded object".into(),
        ));
    }
    Ok(())
}

/// Message stored on a job after a user cancellation.
pub fn cancellation_message(deleted: u64) -> String {
    format!("Cancelled by user. Deleted {deleted} records.")
}

/// Message stored on a job the stale-job reaper gave up on.
pub fn stale_failure_message(timeout_secs: u64) -> String {
    format!("Marked failed: no progress for {timeout_secs} seconds while processing.")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
