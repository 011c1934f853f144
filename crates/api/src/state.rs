use std::sync::Arc;

use kbase_core::rate_limit::AdmissionController;

use crate::config::ServerConfig;
use crate::engine::ImportEngine;
use crate::generation::ContentGenerator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool; `None` when running on in-memory stores.
    pub pool: Option<kbase_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// Ingestion, lifecycle, and status reporting over the configured stores.
    pub imports: Arc<ImportEngine>,
    /// Tiered rate limiter guarding expensive routes.
    pub admission: Arc<AdmissionController>,
    /// Content-generation backend, when one is configured.
    pub generator: Option<Arc<dyn ContentGenerator>>,
}
