//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::Result;
use crate::types::{
    ChatMessage, ChatThread, Collection, CompletionParams, Document, DocumentChunk, IndexCount,
    IndexQuery, Message, Stats, UserId, VectorHit, VectorRecord,
};

/// Relational storage for collections, documents, chunks, threads and messages.
#[async_trait]
pub trait Store: Send + Sync {
    // Collection operations
    async fn create_collection(&self, collection: Collection) -> Result<()>;
    async fn get_collection(&self, id: Ulid) -> Result<Option<Collection>>;
    async fn list_collections(&self, owner_id: UserId) -> Result<Vec<Collection>>;
    async fn list_collections_with_processed(&self, owner_id: UserId) -> Result<Vec<Collection>>;
    async fn delete_collection(&self, id: Ulid) -> Result<()>;

    // Document operations
    async fn insert_document(&self, doc: Document) -> Result<()>;
    async fn get_document(&self, id: Ulid) -> Result<Option<Document>>;
    async fn list_documents(&self, collection_id: Ulid) -> Result<Vec<Document>>;
    async fn count_processed_documents(&self, collection_id: Ulid) -> Result<u64>;
    async fn mark_document_processed(&self, id: Ulid, chunk_count: u32, namespace: &str) -> Result<()>;
    /// Reset `processed` and `chunk_count` before the document's chunks are rebuilt.
    async fn mark_document_unprocessed(&self, id: Ulid) -> Result<()>;
    async fn delete_document(&self, id: Ulid) -> Result<()>;

    // Chunk operations
    async fn insert_chunk(&self, chunk: &DocumentChunk) -> Result<()>;
    async fn get_chunks_for_document(&self, document_id: Ulid) -> Result<Vec<DocumentChunk>>;
    async fn delete_chunks_for_document(&self, document_id: Ulid) -> Result<u64>;

    // Thread operations
    async fn create_thread(&self, thread: ChatThread) -> Result<()>;
    async fn get_thread(&self, id: Ulid) -> Result<Option<ChatThread>>;
    async fn list_threads(&self, owner_id: UserId, limit: u32) -> Result<Vec<ChatThread>>;

    /// Set the title only if the thread has none; returns whether it was set.
    async fn set_thread_title_if_unset(&self, id: Ulid, title: &str) -> Result<bool>;
    async fn delete_thread(&self, id: Ulid) -> Result<()>;
    async fn delete_threads_for_owner(&self, owner_id: UserId) -> Result<u64>;

    // Message operations
    async fn insert_message(&self, message: &Message) -> Result<()>;

    /// All messages of a thread, oldest first.
    async fn list_messages(&self, thread_id: Ulid) -> Result<Vec<Message>>;

    /// The most recent messages of a thread, newest first.
    async fn recent_messages(&self, thread_id: Ulid, limit: u32) -> Result<Vec<Message>>;
    async fn count_user_messages(&self, thread_id: Ulid) -> Result<u64>;

    // Stats
    async fn get_stats(&self, owner_id: Option<UserId>) -> Result<Stats>;
}

/// Raw file storage addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Vec<u8>>;
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Namespaced store of chunk vectors with k-nearest-neighbour search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the namespace if it does not exist.
    async fn ensure_namespace(&self, namespace: &str) -> Result<()>;

    /// Insert or overwrite a record by ID.
    async fn insert(&self, namespace: &str, record: VectorRecord) -> Result<()>;

    /// Up to `k` records ordered by decreasing relevance. A missing or empty
    /// namespace yields an empty result.
    async fn query(&self, namespace: &str, query: IndexQuery<'_>, k: usize) -> Result<Vec<VectorHit>>;

    /// Remove every record of a document; returns how many were removed.
    async fn delete_document(&self, namespace: &str, document_id: Ulid) -> Result<u64>;

    /// Remove a namespace and all its records.
    async fn drop_namespace(&self, namespace: &str) -> Result<()>;

    async fn count(&self, namespace: &str) -> Result<IndexCount>;
}

/// LLM chat-completion capability.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send role-tagged messages, receive a single text completion.
    async fn complete(&self, messages: &[ChatMessage], params: CompletionParams) -> Result<String>;
}

/// Chunking configuration.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target chunk size (in units of the chunker's length function).
    pub chunk_size: usize,

    /// Overlap carried from one chunk into the next.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Chunking strategy trait.
pub trait Chunker: Send + Sync {
    /// Chunk text content into ordered, overlapping pieces.
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<ChunkData>>;
}

/// Raw chunk data before ordinal assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Chunk text content.
    pub content: String,

    /// Length of the content as measured by the chunker.
    pub length: usize,

    /// Byte offset of the chunk in the source text, when it could be located.
    pub offset: Option<usize>,
}
