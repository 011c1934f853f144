//! Direct access to the admission controller, for gateways that enforce
//! limits themselves.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Counters touched by this endpoint live under their own namespace, so
/// unauthenticated callers cannot drain the budgets `enforce` applies.
const EVALUATE_NAMESPACE: &str = "evaluate";

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    pub route_key: String,
}

/// POST /api/v1/rate-limit/evaluate
///
/// Record one attempt against the tiers and return the decision. A denial
/// is a normal 200 response with `allowed: false`. Attempts recorded here
/// never count against routes guarded by the middleware.
pub async fn evaluate(
    State(state): State<AppState>,
    Json(input): Json<EvaluateRequest>,
) -> AppResult<impl IntoResponse> {
    let decision = state
        .admission
        .scoped(EVALUATE_NAMESPACE)
        .evaluate(input.user_id.as_deref(), input.ip.as_deref(), &input.route_key)
        .await?;
    Ok(Json(DataResponse { data: decision }))
}
