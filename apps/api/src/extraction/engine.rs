//! Extraction Engine: turns unstructured text into schema-shaped data via the model.
//!
//! Two response modes:
//! - `Strict`: the model must answer through a forced tool call whose input schema is the
//!   extraction schema. The returned object is then checked exactly; any deviation is a
//!   `SchemaViolation`. No second attempt is made here.
//! - `Freeform`: the model answers in text that should be JSON. Markdown fences are
//!   stripped before parsing; anything that still fails is `MalformedOutput` carrying the
//!   cleaned text.
//!
//! Source text is cut to the first `char_ceiling` characters so the same input always
//! produces the same prompt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::extraction::prompts::{EXTRACTION_PROMPT_TEMPLATE, STRICT_EXTRACTION_SYSTEM};
use crate::extraction::schema::{ExtractionSchema, Leniency};
use crate::generation::error::GenerationError;
use crate::llm_client::prompts::{fill_template, JSON_ONLY_SYSTEM};
use crate::llm_client::{LanguageModel, LlmError, ToolSpec};

/// Default persona for extraction calls that do not bring their own.
const DEFAULT_PERSONA: &str = "You are a precise, structured assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Strict,
    Freeform,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("model output does not match schema '{schema}': {detail}")]
    SchemaViolation { schema: &'static str, detail: String },

    #[error("model output is not usable JSON: {reason}")]
    MalformedOutput { reason: String, raw: String },

    #[error("source text is empty")]
    EmptySource,

    #[error(transparent)]
    Model(#[from] GenerationError),
}

pub struct ExtractionRequest<'a> {
    pub schema: &'static ExtractionSchema,
    /// Task-specific instructions placed above the field list.
    pub instructions: &'a str,
    /// The unstructured document. Subject to the character ceiling.
    pub source_text: &'a str,
    /// Extra context passed through untruncated (e.g. a stored résumé).
    pub context: Option<&'a str>,
    /// Persona for the system prompt; mode-specific rules are appended.
    pub persona: Option<&'a str>,
    pub mode: ResponseMode,
}

/// Schema-conformant extraction result.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredPayload {
    pub schema: &'static str,
    pub fields: Map<String, Value>,
}

impl StructuredPayload {
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, ExtractionError> {
        let schema = self.schema;
        serde_json::from_value(self.into_value()).map_err(|e| ExtractionError::SchemaViolation {
            schema,
            detail: e.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct ExtractionEngine {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    char_ceiling: usize,
}

impl ExtractionEngine {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration, char_ceiling: usize) -> Self {
        Self {
            model,
            timeout,
            char_ceiling,
        }
    }

    pub async fn extract(
        &self,
        request: ExtractionRequest<'_>,
    ) -> Result<StructuredPayload, ExtractionError> {
        let schema = request.schema;
        let source = truncate_source(request.source_text, self.char_ceiling);
        if source.trim().is_empty() {
            return Err(ExtractionError::EmptySource);
        }
        if source.len() < request.source_text.len() {
            info!(
                schema = schema.name,
                original_chars = request.source_text.chars().count(),
                kept_chars = self.char_ceiling,
                "Extraction source truncated"
            );
        }

        let prompt = build_extraction_prompt(&request, source);
        let persona = request.persona.unwrap_or(DEFAULT_PERSONA);

        let fields = match request.mode {
            ResponseMode::Strict => {
                let tool = ToolSpec {
                    name: format!("record_{}", schema.name),
                    description: schema.description.to_string(),
                    input_schema: schema.to_json_schema(),
                };
                let system = format!("{persona}\n\n{STRICT_EXTRACTION_SYSTEM}");

                let value = match self
                    .with_deadline(self.model.complete_with_tool(&prompt, &system, &tool))
                    .await?
                {
                    Ok(value) => value,
                    Err(LlmError::MissingToolCall(name)) => {
                        return Err(ExtractionError::SchemaViolation {
                            schema: schema.name,
                            detail: format!("model answered without calling '{name}'"),
                        })
                    }
                    Err(e) => return Err(GenerationError::from(e).into()),
                };

                schema.conform(value, Leniency::Exact).map_err(|violation| {
                    warn!(schema = schema.name, %violation, "Strict extraction violated schema");
                    ExtractionError::SchemaViolation {
                        schema: schema.name,
                        detail: violation.to_string(),
                    }
                })?
            }
            ResponseMode::Freeform => {
                let system = format!("{persona}\n\n{JSON_ONLY_SYSTEM}");
                let text = self
                    .with_deadline(self.model.complete(&prompt, &system))
                    .await?
                    .map_err(GenerationError::from)?;

                let value = parse_freeform_output(&text)?;
                schema.conform(value, Leniency::Repair).map_err(|violation| {
                    warn!(schema = schema.name, %violation, "Freeform extraction has wrong shape");
                    ExtractionError::MalformedOutput {
                        reason: violation.to_string(),
                        raw: strip_code_fences(&text).to_string(),
                    }
                })?
            }
        };

        Ok(StructuredPayload {
            schema: schema.name,
            fields,
        })
    }

    /// Runs a model call under the extraction wall-clock ceiling.
    async fn with_deadline<T, F>(&self, call: F) -> Result<Result<T, LlmError>, GenerationError>
    where
        F: Future<Output = Result<T, LlmError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))
    }
}

/// Keeps the first `ceiling` characters of `text`, never splitting a character.
pub fn truncate_source(text: &str, ceiling: usize) -> &str {
    match text.char_indices().nth(ceiling) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Removes a leading ```` ``` ```` fence (with or without a language tag) and the
/// matching trailing fence.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = match after_open.split_once('\n') {
        Some((tag, rest)) if is_fence_tag(tag) => rest,
        _ => after_open.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
    };

    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn is_fence_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parses freeform model output as JSON after removing code fences.
pub fn parse_freeform_output(text: &str) -> Result<Value, ExtractionError> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(cleaned).map_err(|e| {
        warn!(
            "Model returned invalid JSON ({e}): {:?}",
            cleaned.chars().take(200).collect::<String>()
        );
        ExtractionError::MalformedOutput {
            reason: e.to_string(),
            raw: cleaned.to_string(),
        }
    })
}

fn build_extraction_prompt(request: &ExtractionRequest<'_>, source: &str) -> String {
    let instructions = match request.context {
        Some(context) => format!("{}\n\nCONTEXT:\n{context}", request.instructions),
        None => request.instructions.to_string(),
    };
    let constraints = request.schema.prompt_constraints();
    fill_template(
        EXTRACTION_PROMPT_TEMPLATE,
        &[
            ("instructions", &instructions),
            ("constraints", &constraints),
            ("source", source),
        ],
    )
}
