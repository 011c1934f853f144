//! Route definitions for content generation.
//!
//! Every route here sits behind the admission middleware.

use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::middleware::rate_limit;
use crate::state::AppState;

/// ```text
/// POST   /generate        -> generate (rate limited)
/// ```
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/generate", post(generation::generate))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            rate_limit::enforce,
        ))
}
