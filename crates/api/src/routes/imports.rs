//! Route definitions for the `/imports` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::imports;
use crate::state::AppState;

/// Routes mounted at `/imports`.
///
/// ```text
/// GET    /                -> list_imports
/// POST   /                -> submit_imports
/// POST   /clear           -> clear_imports
/// POST   /clear-queue     -> clear_import_queue
/// GET    /{id}            -> get_import
/// POST   /{id}/cancel     -> cancel_import
/// ```
pub fn router(max_request_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(imports::list_imports)
                .post(imports::submit_imports)
                .layer(DefaultBodyLimit::max(max_request_bytes)),
        )
        .route("/clear", post(imports::clear_imports))
        .route("/clear-queue", post(imports::clear_import_queue))
        .route("/{id}", get(imports::get_import))
        .route("/{id}/cancel", post(imports::cancel_import))
}
