//! Handlers for the `/imports` resource.
//!
//! Submission accepts `multipart/form-data`; every part that carries a
//! filename is treated as one uploaded file.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use kbase_core::import_job::FileOutcomeStatus;
use kbase_core::types::DbId;

use crate::engine::UploadedFile;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/imports
///
/// Upload a batch of files. Returns the per-file outcomes; 201 when at
/// least one job was created, 200 when every eligible file failed to store.
pub async fn submit_imports(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read '{filename}': {e}")))?;

        files.push(UploadedFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let outcomes = state.imports.ingestion.submit(files).await?;

    let created = outcomes
        .iter()
        .filter(|o| o.status == FileOutcomeStatus::Pending)
        .count();
    tracing::info!(files = outcomes.len(), created, "Import batch submitted");

    let status = if created > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(DataResponse { data: outcomes })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/imports
///
/// Every job, oldest first.
pub async fn list_imports(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.imports.status.list_jobs().await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/imports/{id}
pub async fn get_import(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.imports.status.get_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/imports/{id}/cancel
///
/// Cancel a pending or processing job and delete the entries it produced.
pub async fn cancel_import(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.imports.lifecycle.cancel_job(job_id).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/imports/clear
///
/// Delete all queued jobs and, best effort, their uploaded files.
pub async fn clear_imports(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let outcome = state.imports.lifecycle.clear_pending_jobs().await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/imports/clear-queue
///
/// Delete all queued job rows; uploaded files are kept.
pub async fn clear_import_queue(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let outcome = state.imports.lifecycle.clear_queue_only().await?;
    Ok(Json(DataResponse { data: outcome }))
}
