use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use kbase_core::error::CoreError;

use crate::error::AppResult;
use crate::generation::GenerationRequest;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/generate
///
/// Produce content for a prompt. Runs behind the admission middleware;
/// answers 503 when no generation backend is configured.
pub async fn generate(
    State(state): State<AppState>,
    Json(input): Json<GenerationRequest>,
) -> AppResult<impl IntoResponse> {
    if input.prompt.trim().is_empty() {
        return Err(CoreError::Validation("prompt must not be empty".into()).into());
    }

    let generator = state.generator.as_ref().ok_or(CoreError::Dependency {
        service: "generation",
        message: "no generation backend configured".into(),
    })?;

    let content = generator.generate(&input).await?;
    tracing::info!(model = %content.model, chars = content.content.len(), "Content generated");
    Ok(Json(DataResponse { data: content }))
}
