//! Admission-control middleware.
//!
//! Mount with `route_layer` so the matched route path is available as the
//! route key:
//!
//! ```ignore
//! Router::new()
//!     .route("/generate", post(handler))
//!     .route_layer(axum::middleware::from_fn_with_state(state, rate_limit::enforce))
//! ```

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use kbase_core::rate_limit::RateLimitDecision;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::ClientIdentity;
use crate::state::AppState;

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// `X-RateLimit-*` headers for a decision. Reset is in Unix seconds.
pub fn rate_limit_headers(decision: &RateLimitDecision) -> [(HeaderName, HeaderValue); 3] {
    [
        (LIMIT_HEADER, HeaderValue::from(decision.limit)),
        (REMAINING_HEADER, HeaderValue::from(decision.remaining)),
        (RESET_HEADER, HeaderValue::from(decision.reset_at.timestamp())),
    ]
}

/// Run the admission check before the wrapped handler.
///
/// Denials become 429. A counter-store failure becomes 503, unless
/// `RATE_LIMIT_FAIL_OPEN` is set, in which case the request goes through
/// without rate-limit headers.
pub async fn enforce(
    State(state): State<AppState>,
    identity: ClientIdentity,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    let route_key = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let decision = match state
        .admission
        .evaluate(identity.user_id.as_deref(), identity.ip.as_deref(), &route_key)
        .await
    {
        Ok(decision) => decision,
        Err(e) if state.config.rate_limit.fail_open => {
            tracing::warn!(route_key = %route_key, error = %e, "Admission check failed; letting request through");
            return Ok(next.run(request).await);
        }
        Err(e) => {
            tracing::error!(route_key = %route_key, error = %e, "Admission check failed; rejecting request");
            return Err(AppError::Core(e));
        }
    };

    if !decision.allowed {
        tracing::warn!(
            route_key = %route_key,
            tier = ?decision.denied_tier,
            user_id = ?identity.user_id,
            ip = ?identity.ip,
            "Request rate limited",
        );
        return Err(AppError::RateLimited(decision));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in rate_limit_headers(&decision) {
        headers.insert(name, value);
    }
    Ok(response)
}
