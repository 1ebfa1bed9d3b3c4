use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::info;

use crate::errors::AppError;
use crate::extraction::engine::{ExtractionRequest, ResponseMode};
use crate::extraction::models::ResumeProfile;
use crate::extraction::pdf::extract_pdf_text;
use crate::extraction::prompts::RESUME_PROFILE_INSTRUCTIONS;
use crate::extraction::schema::RESUME_PROFILE;
use crate::state::AppState;

const UPLOAD_FIELD: &str = "file";

/// POST /api/v1/extract/resume
/// Multipart upload with a `file` part holding a PDF résumé.
pub async fn handle_extract_resume(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ResumeProfile>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read multipart data: {e}")))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read file bytes: {e}")))?;
            upload = Some(data);
            break;
        }
    }

    let data = upload.ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    let text = extract_pdf_text(data).await?;
    info!(chars = text.chars().count(), "Résumé PDF parsed");

    let payload = state
        .extractor
        .extract(ExtractionRequest {
            schema: &RESUME_PROFILE,
            instructions: RESUME_PROFILE_INSTRUCTIONS,
            source_text: &text,
            context: None,
            persona: None,
            mode: ResponseMode::Strict,
        })
        .await?;

    Ok(Json(payload.into_typed()?))
}
