// Extraction Engine: unstructured text in, schema-conformant data out.
// Strict mode forces a tool call; freeform mode parses fenced JSON text.

pub mod engine;
pub mod handlers;
pub mod models;
pub mod pdf;
pub mod prompts;
pub mod schema;
