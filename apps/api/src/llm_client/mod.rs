//! LLM client: the single point of entry for all model calls in Pitchkit.
//!
//! No other module may call the Anthropic API directly. Everything else talks to
//! the `LanguageModel` trait, which `LlmClient` implements.
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
pub mod sse;

use sse::{SseDecoder, SseEvent};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls in Pitchkit.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM did not call the '{0}' tool")]
    MissingToolCall(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl LlmError {
    /// True when the model was never reached (connect failure, rate limit, 5xx).
    pub fn is_transport(&self) -> bool {
        match self {
            LlmError::Http(e) => !e.is_timeout() && (e.is_connect() || e.is_request()),
            LlmError::RateLimited { .. } => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Http(e) if e.is_timeout())
    }
}

/// Incremental text deltas from a streamed completion, in model order.
/// Dropping the stream closes the upstream connection.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// A tool definition used to force schema-shaped output.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Everything the rest of the crate may ask of a generative model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Freeform completion; returns the text of the first text block.
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError>;

    /// Forces the model to answer by calling `tool`; returns the tool input verbatim.
    async fn complete_with_tool(
        &self,
        prompt: &str,
        system: &str,
        tool: &ToolSpec,
    ) -> Result<Value, LlmError>;

    /// Opens a streamed completion.
    async fn stream(&self, prompt: &str, system: &str) -> Result<TextStream, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<&'a ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    choice_type: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    /// Extracts the input of the first `tool_use` block calling `tool_name`.
    pub fn tool_input(&self, tool_name: &str) -> Option<&Value> {
        self.content
            .iter()
            .find(|b| b.block_type == "tool_use" && b.name.as_deref() == Some(tool_name))
            .and_then(|b| b.input.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Payload of a single streamed event. Only text deltas and errors matter here.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamPayload {
    ContentBlockDelta { delta: Delta },
    Error { error: AnthropicErrorBody },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// The single LLM client used by all services in Pitchkit.
/// Wraps the Anthropic Messages API with retry logic, forced-tool output and streaming.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    /// No overall request timeout: callers enforce their own wall-clock ceilings,
    /// and a total timeout would cut long streams short.
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?,
            api_key,
        })
    }

    /// Makes a raw call to the Claude API, returning the full response object.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            tools: None,
            tool_choice: None,
        };
        self.send_json(&request_body).await
    }

    async fn send_json(&self, request_body: &AnthropicRequest<'_>) -> Result<LlmResponse, LlmError> {
        let response = self.send_with_retry(request_body).await?;
        let llm_response: LlmResponse = response.json().await?;

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        Ok(llm_response)
    }

    /// Sends the request, retrying on 429 (rate limit) and 5xx errors with exponential
    /// backoff. Only the request itself is retried; a body that has started is never replayed.
    async fn send_with_retry(
        &self,
        request_body: &AnthropicRequest<'_>,
    ) -> Result<Response, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }

    async fn complete_with_tool(
        &self,
        prompt: &str,
        system: &str,
        tool: &ToolSpec,
    ) -> Result<Value, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            tools: Some(vec![tool]),
            tool_choice: Some(ToolChoice {
                choice_type: "tool",
                name: &tool.name,
            }),
        };

        let response = self.send_json(&request_body).await?;
        response
            .tool_input(&tool.name)
            .cloned()
            .ok_or_else(|| LlmError::MissingToolCall(tool.name.clone()))
    }

    async fn stream(&self, prompt: &str, system: &str) -> Result<TextStream, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
            tools: None,
            tool_choice: None,
        };

        let response = self.send_with_retry(&request_body).await?;
        debug!("LLM stream opened");
        Ok(decode_text_stream(response.bytes_stream().boxed()))
    }
}

type ByteStream = BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>;

struct DecodeState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    /// Set only by `message_stop`; EOF without it means the body was cut short.
    stopped: bool,
    done: bool,
}

/// What one decoded event means for the stream as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Continue,
    Stopped,
    Failed,
}

const TRUNCATED_STREAM: &str = "upstream closed before message_stop";

/// Turns a raw SSE byte stream into text deltas. Stops after `message_stop`,
/// an `error` event, or a transport error. A body that ends without `message_stop`
/// yields a final `Err` so partial output is never mistaken for a finished one.
fn decode_text_stream(body: ByteStream) -> TextStream {
    let state = DecodeState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        stopped: false,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.done = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.push(&chunk) {
                        match interpret_event(&event, &mut state.pending) {
                            Progress::Continue => {}
                            Progress::Stopped => {
                                state.stopped = true;
                                state.done = true;
                                break;
                            }
                            Progress::Failed => {
                                state.done = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(LlmError::Http(e)));
                }
                None => {
                    let progress = match state.decoder.finish() {
                        Some(event) => interpret_event(&event, &mut state.pending),
                        None => Progress::Continue,
                    };
                    if progress == Progress::Continue && !state.stopped {
                        warn!("LLM stream ended without message_stop");
                        state
                            .pending
                            .push_back(Err(LlmError::Stream(TRUNCATED_STREAM.to_string())));
                    }
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

/// Queues the text or error carried by `event`.
fn interpret_event(event: &SseEvent, pending: &mut VecDeque<Result<String, LlmError>>) -> Progress {
    match serde_json::from_str::<StreamPayload>(&event.data) {
        Ok(StreamPayload::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        }) => {
            if !text.is_empty() {
                pending.push_back(Ok(text));
            }
            Progress::Continue
        }
        Ok(StreamPayload::Error { error }) => {
            pending.push_back(Err(LlmError::Stream(error.message)));
            Progress::Failed
        }
        Ok(StreamPayload::MessageStop) => Progress::Stopped,
        Ok(_) => Progress::Continue,
        Err(e) => {
            warn!("Skipping undecodable stream event {:?}: {e}", event.event);
            Progress::Continue
        }
    }
}
