//! docrag-query - Retrieval and answer composition
//!
//! Answers a question against one collection by retrieving the most relevant
//! chunks from the collection's index namespace and conditioning a single
//! LLM completion on them.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag_query::AnswerComposer;
//! use std::sync::Arc;
//!
//! let composer = AnswerComposer::new(store, index, Some(embedder), llm, config.retrieval.clone());
//! let answer = composer.answer("What is the refund policy?", collection_id, user_id).await;
//! println!("{}", answer.text);
//! ```

mod answer;
mod composer;
mod context;

pub use answer::{AnswerStatus, RagAnswer};
pub use composer::AnswerComposer;
pub use context::{build_prompt, dedup_sources};
