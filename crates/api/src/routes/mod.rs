pub mod generation;
pub mod health;
pub mod imports;
pub mod rate_limit;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /imports                       submit (multipart POST), list
/// /imports/{id}                  get
/// /imports/{id}/cancel           cancel with compensating delete (POST)
/// /imports/clear                 delete queued jobs and their files (POST)
/// /imports/clear-queue           delete queued jobs only (POST)
///
/// /rate-limit/evaluate           evaluate the admission tiers (POST)
///
/// /generate                      content generation, rate limited (POST)
/// ```
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest(
            "/imports",
            imports::router(state.config.import.max_request_bytes),
        )
        .nest("/rate-limit", rate_limit::router())
        .merge(generation::router(state.clone()))
}
