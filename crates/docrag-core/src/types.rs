//! Core domain types for docrag.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of a user, owned by the external authentication layer.
pub type UserId = i64;

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Vector index namespace for one user's collection.
pub fn namespace_for(owner_id: UserId, collection_id: Ulid) -> String {
    format!("user_{}_col_{}", owner_id, collection_id)
}

/// Supported upload file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Doc,
    Docx,
    Txt,
}

impl FileType {
    /// Detect file type from an extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }

    /// Detect file type from a filename.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Lowercase extension used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Txt => "txt",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named grouping of documents owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Owning user.
    pub owner_id: UserId,

    /// Display name.
    pub name: String,

    /// Free-form description (may be empty).
    pub description: String,

    /// Creation timestamp (Unix millis).
    pub created_at: u64,
}

impl Collection {
    /// Create a new collection.
    pub fn new(owner_id: UserId, name: &str, description: Option<&str>) -> Self {
        Self {
            id: Ulid::new(),
            owner_id,
            name: name.to_string(),
            description: description.unwrap_or_default().to_string(),
            created_at: now_millis(),
        }
    }

    /// Vector index namespace of this collection.
    pub fn namespace(&self) -> String {
        namespace_for(self.owner_id, self.id)
    }
}

/// A single uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Collection this document belongs to.
    pub collection_id: Ulid,

    /// Filename as uploaded.
    pub filename: String,

    /// Key of the raw file in blob storage.
    pub storage_key: String,

    /// File type derived from the extension.
    pub file_type: FileType,

    /// Size of the raw file in bytes.
    pub size_bytes: u64,

    /// Set once ingestion has completed.
    pub processed: bool,

    /// Number of chunks produced by the last successful ingestion.
    pub chunk_count: u32,

    /// Vector index namespace (empty until processed).
    pub namespace: String,

    /// Upload timestamp (Unix millis).
    pub uploaded_at: u64,
}

impl Document {
    /// Create a new, unprocessed document.
    pub fn new(
        collection_id: Ulid,
        filename: &str,
        storage_key: &str,
        file_type: FileType,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: Ulid::new(),
            collection_id,
            filename: filename.to_string(),
            storage_key: storage_key.to_string(),
            file_type,
            size_bytes,
            processed: false,
            chunk_count: 0,
            namespace: String::new(),
            uploaded_at: now_millis(),
        }
    }
}

/// One segment of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Parent document ID.
    pub document_id: Ulid,

    /// Ordinal within the document (0-based, dense).
    pub chunk_index: u32,

    /// Chunk text content.
    pub content: String,

    /// 1-based page the chunk starts on, when the source has pages.
    pub page_number: Option<u32>,
}

/// Provenance attached to every vector index record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: Ulid,
    pub chunk_index: u32,
    pub filename: String,
    pub page_number: Option<u32>,
}

/// A record stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// `{document_id}_{chunk_index}`.
    pub id: String,

    /// Embedding, absent when the record is text-only.
    pub embedding: Option<Vec<f32>>,

    /// Chunk text.
    pub content: String,

    /// Chunk provenance.
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    /// Build a record whose ID is derived from its metadata.
    pub fn new(metadata: ChunkMetadata, content: &str, embedding: Option<Vec<f32>>) -> Self {
        Self {
            id: Self::record_id(metadata.document_id, metadata.chunk_index),
            embedding,
            content: content.to_string(),
            metadata,
        }
    }

    /// Canonical record ID for a document chunk.
    pub fn record_id(document_id: Ulid, chunk_index: u32) -> String {
        format!("{}_{}", document_id, chunk_index)
    }
}

/// What to search the vector index with.
#[derive(Debug, Clone, Copy)]
pub enum IndexQuery<'a> {
    /// Nearest neighbours by cosine similarity.
    Vector(&'a [f32]),

    /// Full-text relevance, used when no embedding provider is available.
    Text(&'a str),
}

/// A single vector index search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,

    /// Relevance score (higher is better).
    pub score: f32,

    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Record counts for a namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCount {
    pub records: u64,
    pub with_vectors: u64,
}

/// A source attributed to a RAG answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    pub chunk_index: u32,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A conversation owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: Ulid,
    pub owner_id: UserId,

    /// Set from the first user message; `None` until then.
    pub title: Option<String>,

    pub created_at: u64,
    pub updated_at: u64,
}

impl ChatThread {
    /// Create a new, untitled thread.
    pub fn new(owner_id: UserId) -> Self {
        let now = now_millis();
        Self {
            id: Ulid::new(),
            owner_id,
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title for display.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("New Conversation")
    }
}

/// One turn in a chat thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Ulid,
    pub thread_id: Ulid,
    pub role: Role,
    pub content: String,

    /// Whether this is an answer composed from retrieved documents.
    pub is_rag_response: bool,

    /// Attributed sources (RAG answers only).
    #[serde(default)]
    pub sources: Vec<Source>,

    pub created_at: u64,
}

impl Message {
    fn new(thread_id: Ulid, role: Role, content: &str) -> Self {
        Self {
            id: Ulid::new(),
            thread_id,
            role,
            content: content.to_string(),
            is_rag_response: false,
            sources: Vec::new(),
            created_at: now_millis(),
        }
    }

    /// A message written by the user.
    pub fn user(thread_id: Ulid, content: &str) -> Self {
        Self::new(thread_id, Role::User, content)
    }

    /// A plain assistant reply.
    pub fn assistant(thread_id: Ulid, content: &str) -> Self {
        Self::new(thread_id, Role::Assistant, content)
    }

    /// An assistant reply composed from retrieved documents.
    pub fn rag_answer(thread_id: Ulid, content: &str, sources: Vec<Source>) -> Self {
        Self {
            is_rag_response: true,
            sources,
            ..Self::new(thread_id, Role::Assistant, content)
        }
    }
}

/// Role of a message sent to the completion capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A role-tagged message for the completion capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        match message.role {
            Role::User => Self::user(message.content.clone()),
            Role::Assistant => Self::assistant(message.content.clone()),
        }
    }
}

/// Generation limits for a completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Statistics about the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub collections: u64,
    pub documents: u64,
    pub processed_documents: u64,
    pub chunks: u64,
    pub threads: u64,
    pub messages: u64,

    /// Database size in bytes.
    pub storage_bytes: u64,

    /// Optional owner filter applied.
    pub owner: Option<UserId>,
}
