//! Configuration types for docrag.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::traits::ChunkConfig;

/// Main configuration for docrag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Storage locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Retrieval and answer composition.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Plain conversation settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// LLM completion endpoint.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Upload limits.
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the relational SQLite database.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Path to the vector index SQLite database.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Directory holding uploaded files.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            index_path: default_index_path(),
            blob_dir: default_blob_dir(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `"onnx"`, `"hashing"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Path to the ONNX model file.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Path to tokenizer.json (defaults to the model's directory).
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,

    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per input; longer inputs are truncated.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_path: default_model_path(),
            tokenizer_path: None,
            dimension: default_dimension(),
            max_tokens: default_embedding_max_tokens(),
            num_threads: default_num_threads(),
        }
    }
}

impl EmbeddingConfig {
    /// Tokenizer location, falling back to `tokenizer.json` next to the model.
    pub fn resolved_tokenizer_path(&self) -> PathBuf {
        self.tokenizer_path.clone().unwrap_or_else(|| {
            self.model_path
                .parent()
                .map(|dir| dir.join("tokenizer.json"))
                .unwrap_or_else(|| PathBuf::from("tokenizer.json"))
        })
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of overlap between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl From<&ChunkingConfig> for ChunkConfig {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks fetched from the index.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Number of top chunks placed in the prompt and attributed as sources.
    #[serde(default = "default_context_chunks")]
    pub context_chunks: usize,

    /// Maximum output tokens for the answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for the answer.
    #[serde(default = "default_rag_temperature")]
    pub temperature: f32,

    /// Answer when the collection has no processed documents.
    #[serde(default = "default_no_documents_message")]
    pub no_documents_message: String,

    /// Answer when the index returned nothing.
    #[serde(default = "default_no_results_message")]
    pub no_results_message: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_chunks: default_context_chunks(),
            max_tokens: default_max_tokens(),
            temperature: default_rag_temperature(),
            no_documents_message: default_no_documents_message(),
            no_results_message: default_no_results_message(),
        }
    }
}

/// Plain chat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of prior messages sent as conversation history.
    #[serde(default = "default_history_window")]
    pub history_window: u32,

    /// Maximum output tokens for a reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature for a reply.
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,

    /// System instruction prepended to every plain conversation.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Characters of the first user message used as the thread title.
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            max_tokens: default_max_tokens(),
            temperature: default_chat_temperature(),
            system_prompt: default_system_prompt(),
            title_max_chars: default_title_max_chars(),
        }
    }
}

/// LLM endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Chat model name.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries for rate limits, server errors and network errors.
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted file in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

// Default value functions

fn default_busy_timeout() -> u32 {
    30000
}

fn default_provider() -> String {
    "onnx".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_max_tokens() -> usize {
    256
}

fn default_num_threads() -> usize {
    4
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    5
}

fn default_context_chunks() -> usize {
    3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_rag_temperature() -> f32 {
    0.3
}

fn default_chat_temperature() -> f32 {
    0.7
}

fn default_no_documents_message() -> String {
    "No processed documents found.".to_string()
}

fn default_no_results_message() -> String {
    "No relevant information found.".to_string()
}

fn default_history_window() -> u32 {
    10
}

fn default_system_prompt() -> String {
    "You are a helpful AI assistant.".to_string()
}

fn default_title_max_chars() -> usize {
    50
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_llm_retries() -> u32 {
    2
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docrag")
}

fn default_database_path() -> PathBuf {
    data_dir().join("docrag.db")
}

fn default_index_path() -> PathBuf {
    data_dir().join("index.db")
}

fn default_blob_dir() -> PathBuf {
    data_dir().join("files")
}

fn default_model_path() -> PathBuf {
    data_dir()
        .join("models")
        .join("all-MiniLM-L6-v2")
        .join("model.onnx")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::error::RagError::config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("docrag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("docrag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}
