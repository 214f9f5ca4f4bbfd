//! docrag-llm - Chat completions
//!
//! [`OpenAiClient`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint with retry and backoff. [`MockCompletionClient`] returns scripted
//! replies and records what it was sent, for tests and offline runs.

mod mock;
mod openai;

pub use mock::{CompletionCall, MockCompletionClient};
pub use openai::OpenAiClient;

// Re-export the CompletionClient trait for convenience
pub use docrag_core::CompletionClient;
