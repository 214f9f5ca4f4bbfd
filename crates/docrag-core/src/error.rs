//! Error types for docrag.

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in docrag.
///
/// Soft outcomes (empty extraction, no chunks, no relevant results) are not
/// errors; they are reported through `IngestOutcome` and `RagAnswer`.
#[derive(Error, Debug)]
pub enum RagError {
    /// Collection not found (or not owned by the requesting user).
    #[error("Collection not found: {id}")]
    CollectionNotFound { id: String },

    /// Document not found.
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// Chat thread not found.
    #[error("Thread not found: {id}")]
    ThreadNotFound { id: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Upload with an extension outside pdf/doc/docx/txt.
    #[error("Invalid file type '{extension}'. Allowed: pdf, doc, docx, txt")]
    UnsupportedFileType { extension: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Text extraction error.
    #[error("Extraction error: {message}")]
    Extraction { message: String },

    /// Chunking error.
    #[error("Chunking error: {message}")]
    Chunking { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Vector index error.
    #[error("Index error: {message}")]
    Index { message: String },

    /// LLM completion error.
    #[error("LLM error: {message}")]
    Llm { message: String },

    /// Blob storage error.
    #[error("Blob storage error: {message}")]
    Blob { message: String },

    /// Assistant response could not be produced or persisted.
    #[error("Failed to process message: {message}")]
    Orchestration { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RagError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Create a chunking error.
    pub fn chunking(message: impl Into<String>) -> Self {
        Self::Chunking {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a vector index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a blob storage error.
    pub fn blob(message: impl Into<String>) -> Self {
        Self::Blob {
            message: message.into(),
        }
    }

    /// Create an orchestration error.
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Stable error code for structured responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::ThreadNotFound { .. } => "THREAD_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Extraction { .. } => "EXTRACTION_ERROR",
            Self::Chunking { .. } => "CHUNKING_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Index { .. } => "INDEX_ERROR",
            Self::Llm { .. } => "LLM_ERROR",
            Self::Blob { .. } => "BLOB_ERROR",
            Self::Orchestration { .. } => "ORCHESTRATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }
}
