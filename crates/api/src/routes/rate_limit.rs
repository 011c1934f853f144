use axum::routing::post;
use axum::Router;

use crate::handlers::rate_limit;
use crate::state::AppState;

/// Routes mounted at `/rate-limit`.
///
/// ```text
/// POST   /evaluate        -> evaluate
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/evaluate", post(rate_limit::evaluate))
}
