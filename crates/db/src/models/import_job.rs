//! Import job rows.
//!
//! Maps to the `import_jobs` table. Status is stored as lowercase text and
//! parsed into [`ImportJobStatus`] when the row is lifted into the domain.

use kbase_core::import_job::{ImportJob, ImportJobStatus};
use kbase_core::stores::StoreError;
use kbase_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `import_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct ImportJobRow {
    pub id: DbId,
    pub filename: String,
    pub file_ref: String,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ImportJobRow> for ImportJob {
    type Error = StoreError;

    fn try_from(row: ImportJobRow) -> Result<Self, Self::Error> {
        let status: ImportJobStatus =
            row.status
                .parse()
                .map_err(|_| StoreError::InvalidResponse {
                    store: "job_store",
                    message: format!("job {} has unknown status '{}'", row.id, row.status),
                })?;

        Ok(ImportJob {
            id: row.id,
            filename: row.filename,
            file_ref: row.file_ref,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            error_message: row.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(status: &str) -> ImportJobRow {
        let now = Utc::now();
        ImportJobRow {
            id: 7,
            filename: "notes.txt".into(),
            file_ref: "imports/abc-notes.txt".into(),
            status: status.into(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn known_status_lifts_into_domain() {
        let job = ImportJob::try_from(row("processing")).unwrap();
        assert_eq!(job.status, ImportJobStatus::Processing);
        assert_eq!(job.file_ref, "imports/abc-notes.txt");
    }

    #[test]
    fn unknown_status_is_invalid_response() {
        let err = ImportJob::try_from(row("queued")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse { store: "job_store", .. }));
    }
}
