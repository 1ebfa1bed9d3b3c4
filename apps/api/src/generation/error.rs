use std::time::Duration;

use thiserror::Error;

use crate::llm_client::LlmError;

/// Why a model call produced no usable text. All variants are safe to retry:
/// nothing has been persisted when one of these is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("model call exceeded its {}s deadline", .0.as_secs())]
    Timeout(Duration),

    #[error("model unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl GenerationError {
    /// Stable machine-readable code for error envelopes and terminal frames.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::GenerationFailed(_) => "GENERATION_FAILED",
            GenerationError::Timeout(_) => "TIMEOUT",
            GenerationError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
        }
    }
}

impl From<LlmError> for GenerationError {
    fn from(e: LlmError) -> Self {
        if e.is_transport() || e.is_timeout() {
            GenerationError::UpstreamUnavailable(e.to_string())
        } else {
            GenerationError::GenerationFailed(e.to_string())
        }
    }
}
