//! Repository for the `kb_entries` table.

use sqlx::PgPool;
use kbase_core::types::{DbId, Timestamp};

use crate::models::entry::{CreateKbEntry, KbEntry};

const COLUMNS: &str = "id, title, body, produced_by_job_id, created_at, updated_at";

/// Queries over knowledge-base entries.
pub struct EntryRepo;

impl EntryRepo {
    pub async fn create(pool: &PgPool, body: &CreateKbEntry) -> Result<KbEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO kb_entries (title, body, produced_by_job_id) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, KbEntry>(&query)
            .bind(&body.title)
            .bind(&body.body)
            .bind(body.produced_by_job_id)
            .fetch_one(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM kb_entries")
            .fetch_one(pool)
            .await
    }

    /// Delete every entry created at or after `watermark`.
    pub async fn delete_created_since(
        pool: &PgPool,
        watermark: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM kb_entries WHERE created_at >= $1")
            .bind(watermark)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every entry attributed to `job_id`.
    pub async fn delete_produced_by(pool: &PgPool, job_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM kb_entries WHERE produced_by_job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
