//! docrag-store - Persistence
//!
//! - [`SqliteStore`]: collections, documents, chunks, chat threads and messages
//! - [`SqliteVectorIndex`]: namespaced chunk records with cosine and full-text search
//! - [`FsBlobStore`]: uploaded files on the local filesystem

mod blob;
mod connection;
mod schema;
mod sqlite;
mod vector;

pub use blob::FsBlobStore;
pub use sqlite::SqliteStore;
pub use vector::SqliteVectorIndex;

// Re-export schema for testing/migrations
pub use schema::{INDEX_SCHEMA, SCHEMA};
