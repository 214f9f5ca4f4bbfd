//! docrag-chat - Conversation orchestration
//!
//! Persists each user turn, then answers it either as plain conversation
//! (system prompt plus a bounded history window) or through the answer
//! composer against a collection, and persists the reply.

mod orchestrator;

pub use orchestrator::{thread_title, ChatMode, ConversationOrchestrator, Exchange};
