//! docrag-service - Service facade
//!
//! Wires storage, embedding, ingestion, retrieval and conversation into one
//! owner-scoped API. Every operation returns a [`ToolResult`] rather than
//! failing, so front-ends can print or serialize it directly.
//!
//! # Operations
//!
//! - Collections: create, list, list with processed documents, show, delete
//! - Documents: upload (validated, ingested immediately), reingest, delete
//! - `ask` - answer a question from a collection
//! - Threads: create, list, show, delete, clear, send a message
//! - `stats` - store and index statistics

mod service;

pub use service::{AskParams, CollectionParams, DocRagService, SendParams, ToolResult, THREAD_LIST_LIMIT};
