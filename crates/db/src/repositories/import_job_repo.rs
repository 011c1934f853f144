//! Repository for the `import_jobs` table.

use sqlx::PgPool;
use kbase_core::types::{DbId, Timestamp};

use crate::models::import_job::ImportJobRow;

/// Column list shared across queries.
const COLUMNS: &str = "id, filename, file_ref, status, error_message, created_at, updated_at";

/// Queries over import jobs.
pub struct ImportJobRepo;

impl ImportJobRepo {
    /// Insert a `pending` job, returning the created row.
    pub async fn create(
        pool: &PgPool,
        filename: &str,
        file_ref: &str,
    ) -> Result<ImportJobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_jobs (filename, file_ref, status) \
             VALUES ($1, $2, 'pending') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(filename)
            .bind(file_ref)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ImportJobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_jobs WHERE id = $1");
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Every job, oldest first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<ImportJobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_jobs ORDER BY created_at ASC, id ASC");
        sqlx::query_as::<_, ImportJobRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Jobs whose status is in `statuses`, oldest first.
    pub async fn list_by_statuses(
        pool: &PgPool,
        statuses: &[String],
    ) -> Result<Vec<ImportJobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_jobs \
             WHERE status = ANY($1) \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(statuses)
            .fetch_all(pool)
            .await
    }

    /// Guarded status update. Only rows currently in one of `from` move;
    /// returns `None` when nothing matched.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: &[String],
        to: &str,
        error_message: Option<&str>,
    ) -> Result<Option<ImportJobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE import_jobs \
             SET status = $3, error_message = $4, updated_at = NOW() \
             WHERE id = $1 AND status = ANY($2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportJobRow>(&query)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }

    /// Delete the given rows. Returns the number removed.
    pub async fn delete_many(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM import_jobs WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_by_statuses(pool: &PgPool, statuses: &[String]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM import_jobs WHERE status = ANY($1)")
            .bind(statuses)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark `processing` rows untouched since `cutoff` as failed.
    pub async fn fail_stale_processing(
        pool: &PgPool,
        cutoff: Timestamp,
        error_message: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status = 'failed', error_message = $2, updated_at = NOW() \
             WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(cutoff)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
