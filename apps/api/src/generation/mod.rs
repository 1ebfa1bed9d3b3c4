// Generation: streamed and extracted artifacts for job applications.
// All model calls go through llm_client; nothing here talks to the provider directly.

pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod protocol;
pub mod store;
pub mod streaming;
