//! PostgreSQL and Redis adapters for the importer.
//!
//! Repositories are zero-sized structs whose methods take `&PgPool` and
//! return raw `sqlx` results; the `Pg*Store` types wrap them behind the
//! `kbase_core::stores` traits.

use sqlx::postgres::PgPoolOptions;

pub mod counters;
pub mod models;
pub mod repositories;
pub mod store;

pub use counters::RedisCounterStore;
pub use store::{PgEntryStore, PgJobStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}
