//! Knowledge-base entry rows.

use kbase_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `kb_entries` table.
#[derive(Debug, Clone, FromRow)]
pub struct KbEntry {
    pub id: DbId,
    pub title: String,
    pub body: String,
    pub produced_by_job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting an entry.
#[derive(Debug, Clone)]
pub struct CreateKbEntry {
    pub title: String,
    pub body: String,
    pub produced_by_job_id: Option<DbId>,
}
