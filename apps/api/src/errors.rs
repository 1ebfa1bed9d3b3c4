use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::extraction::engine::ExtractionError;
use crate::extraction::pdf::PdfError;
use crate::generation::error::GenerationError;
use crate::generation::orchestrator::OrchestrationError;
use crate::payments::checkout::CheckoutError;
use crate::payments::reconciler::ReconcileError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Model-side failures are flagged `retryable`; trust-boundary failures never are.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Payment event '{event_name}' has no user id")]
    MissingSubject { event_name: String },

    #[error("No profile for paying user '{user_id}'")]
    SubjectNotFound { user_id: String },

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::MissingSubject { event_name, .. } => {
                AppError::MissingSubject { event_name }
            }
            ReconcileError::SubjectNotFound { user_id } => AppError::SubjectNotFound { user_id },
            ReconcileError::Store(e) => AppError::Database(e),
        }
    }
}

impl From<ExtractionError> for AppError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::SchemaViolation { schema, detail } => {
                AppError::SchemaViolation(format!("{schema}: {detail}"))
            }
            ExtractionError::MalformedOutput { reason, .. } => AppError::MalformedOutput(reason),
            ExtractionError::EmptySource => AppError::UnprocessableEntity(
                "No text could be extracted from the document".to_string(),
            ),
            ExtractionError::Model(e) => AppError::Generation(e),
        }
    }
}

impl From<OrchestrationError> for AppError {
    fn from(e: OrchestrationError) -> Self {
        match e {
            OrchestrationError::ApplicationNotFound(id) => {
                AppError::NotFound(format!("Application {id} not found"))
            }
            OrchestrationError::MissingResume => {
                AppError::Validation(OrchestrationError::MissingResume.to_string())
            }
            OrchestrationError::Generation(e) => AppError::Generation(e),
            OrchestrationError::Extraction(e) => e.into(),
            OrchestrationError::Store(e) => AppError::Database(e),
        }
    }
}

impl From<PdfError> for AppError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::Unreadable(msg) => AppError::UnreadableDocument(msg),
            PdfError::Task(e) => AppError::Internal(anyhow::anyhow!("PDF task failed: {e}")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, retryable) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), false),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                false,
            ),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
                false,
            ),
            AppError::UnreadableDocument(msg) => {
                tracing::warn!("Unreadable upload: {msg}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNREADABLE_DOCUMENT",
                    "The uploaded file could not be read as a PDF".to_string(),
                    false,
                )
            }
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Invalid signature".to_string(),
                false,
            ),
            AppError::MissingSubject { .. } => (
                StatusCode::BAD_REQUEST,
                "MISSING_SUBJECT",
                self.to_string(),
                false,
            ),
            AppError::SubjectNotFound { .. } => (
                StatusCode::NOT_FOUND,
                "SUBJECT_NOT_FOUND",
                self.to_string(),
                false,
            ),
            AppError::SchemaViolation(msg) => {
                tracing::warn!("Schema violation: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "SCHEMA_VIOLATION",
                    "The AI response did not match the expected structure".to_string(),
                    true,
                )
            }
            AppError::MalformedOutput(msg) => {
                tracing::warn!("Malformed model output: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "MALFORMED_OUTPUT",
                    "The AI response could not be parsed".to_string(),
                    true,
                )
            }
            AppError::Generation(e) => {
                tracing::error!("Generation error: {e}");
                let status = match e {
                    GenerationError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
                    GenerationError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    GenerationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                };
                (status, e.code(), e.to_string(), true)
            }
            AppError::Checkout(e) => {
                tracing::error!("Checkout error: {e}");
                match e {
                    CheckoutError::Http(_) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "UPSTREAM_UNAVAILABLE",
                        "The payment processor could not be reached".to_string(),
                        true,
                    ),
                    _ => (
                        StatusCode::BAD_GATEWAY,
                        "CHECKOUT_FAILED",
                        "The payment processor rejected the checkout".to_string(),
                        false,
                    ),
                }
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    false,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    false,
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "retryable": retryable
            }
        }));

        (status, body).into_response()
    }
}
