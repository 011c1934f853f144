//! Tests for `AppError` -> HTTP response mapping.
//!
//! These tests do NOT need an HTTP server; they call `IntoResponse`
//! directly on `AppError` values.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use http_body_util::BodyExt;
use kbase_api::error::AppError;
use kbase_core::error::CoreError;
use kbase_core::rate_limit::{RateLimitDecision, Tier};
use kbase_core::stores::StoreError;

/// Helper: convert an `AppError` into its status code, headers and parsed JSON body.
async fn error_to_response(
    err: AppError,
) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, headers, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "ImportJob",
        id: 42,
    });

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "ImportJob with id 42 not found");
}

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("No files were uploaded".into()));

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "No files were uploaded");
}

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("already completed".into()));

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn dependency_error_returns_503_without_leaking_details() {
    let err = AppError::Core(CoreError::from(StoreError::unavailable(
        "job_store",
        "password authentication failed for user \"kbase\"",
    )));

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "DEPENDENCY_ERROR");
    assert!(!json["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("secret bucket credentials".into());

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("Invalid multipart body".into());

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn rate_limited_returns_429_with_retry_metadata() {
    let reset_at = Utc::now() + chrono::Duration::seconds(30);
    let err = AppError::RateLimited(RateLimitDecision {
        allowed: false,
        limit: 10,
        remaining: 0,
        reset_at,
        denied_tier: Some(Tier::User),
    });

    let (status, headers, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "RATE_LIMITED");
    assert_eq!(json["tier"], "user");
    let retry_after = json["retry_after"].as_u64().unwrap();
    assert!((29..=30).contains(&retry_after));
    assert_eq!(headers["retry-after"], retry_after.to_string().as_str());
    assert_eq!(headers["x-ratelimit-limit"], "10");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert_eq!(
        headers["x-ratelimit-reset"],
        reset_at.timestamp().to_string().as_str()
    );
}
