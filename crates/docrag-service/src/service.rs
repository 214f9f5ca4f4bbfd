//! Service facade.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ulid::Ulid;

use docrag_chat::{ChatMode, ConversationOrchestrator};
use docrag_core::{
    BlobStore, ChatThread, Collection, CompletionClient, Document, Embedder, FileType, IndexCount,
    Message, RagConfig, RagError, Result, Role, Source, Store, UploadConfig, UserId, VectorIndex,
};
use docrag_embed::load_embedder;
use docrag_ingest::{IngestOutcome, IngestionPipeline};
use docrag_llm::OpenAiClient;
use docrag_query::{AnswerComposer, AnswerStatus};
use docrag_store::{FsBlobStore, SqliteStore, SqliteVectorIndex};

/// Most threads shown by [`DocRagService::list_threads`].
pub const THREAD_LIST_LIMIT: u32 = 20;

/// Collection creation parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct CollectionParams {
    /// Collection name.
    pub name: String,

    /// Description (optional).
    pub description: Option<String>,
}

/// Question against a collection.
#[derive(Debug, Deserialize, Serialize)]
pub struct AskParams {
    pub collection_id: Ulid,
    pub query: String,
}

/// Message for a thread; RAG mode when a collection is given.
#[derive(Debug, Deserialize, Serialize)]
pub struct SendParams {
    pub thread_id: Ulid,
    pub content: String,
    pub collection_id: Option<Ulid>,
}

/// Operation result.
#[derive(Debug, Serialize)]
pub struct ToolResult {
    /// Whether the operation was successful.
    pub success: bool,

    /// Result message or content.
    pub message: String,

    /// ID of the entity the operation created or acted on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Ulid>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: Ulid) -> Self {
        self.id = Some(id);
        self
    }
}

/// Owner-scoped entry point to every docrag operation.
pub struct DocRagService {
    store: Arc<dyn Store>,
    index: Arc<dyn VectorIndex>,
    blobs: Arc<dyn BlobStore>,
    pipeline: IngestionPipeline,
    composer: Arc<AnswerComposer>,
    orchestrator: ConversationOrchestrator,
    upload: UploadConfig,
}

impl DocRagService {
    /// Open the on-disk stores named by `config` and wire every component.
    pub fn open(config: &RagConfig) -> Result<Self> {
        let storage = &config.storage;
        info!("Opening docrag data at {:?}", storage.database_path);

        for path in [&storage.database_path, &storage.index_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&storage.blob_dir)?;

        let store = Arc::new(SqliteStore::open(&storage.database_path, storage.busy_timeout_ms)?);
        let index = Arc::new(SqliteVectorIndex::open(&storage.index_path, storage.busy_timeout_ms)?);
        let blobs = Arc::new(FsBlobStore::new(&storage.blob_dir));
        let embedder = load_embedder(&config.embedding);
        let llm = Arc::new(OpenAiClient::from_config(&config.llm)?);

        Ok(Self::with_components(store, index, blobs, embedder, llm, config))
    }

    /// Wire the service from already constructed components.
    pub fn with_components(
        store: Arc<dyn Store>,
        index: Arc<dyn VectorIndex>,
        blobs: Arc<dyn BlobStore>,
        embedder: Option<Arc<dyn Embedder>>,
        llm: Arc<dyn CompletionClient>,
        config: &RagConfig,
    ) -> Self {
        if embedder.is_none() {
            warn!("No embedding provider; documents are indexed for text search only");
        }

        let pipeline = IngestionPipeline::new(
            store.clone(),
            blobs.clone(),
            index.clone(),
            embedder.clone(),
            (&config.chunking).into(),
        );
        let composer = Arc::new(AnswerComposer::new(
            store.clone(),
            index.clone(),
            embedder,
            llm.clone(),
            config.retrieval.clone(),
        ));
        let orchestrator =
            ConversationOrchestrator::new(store.clone(), composer.clone(), llm, config.chat.clone());

        Self {
            store,
            index,
            blobs,
            pipeline,
            composer,
            orchestrator,
            upload: config.upload.clone(),
        }
    }

    // Ownership checks

    async fn owned_collection(&self, owner: UserId, id: Ulid) -> Result<Collection> {
        self.store
            .get_collection(id)
            .await?
            .filter(|c| c.owner_id == owner)
            .ok_or_else(|| RagError::CollectionNotFound { id: id.to_string() })
    }

    async fn owned_document(&self, owner: UserId, id: Ulid) -> Result<(Document, Collection)> {
        let not_found = || RagError::DocumentNotFound { id: id.to_string() };

        let doc = self.store.get_document(id).await?.ok_or_else(not_found)?;
        let collection = self
            .store
            .get_collection(doc.collection_id)
            .await?
            .filter(|c| c.owner_id == owner)
            .ok_or_else(not_found)?;
        Ok((doc, collection))
    }

    async fn owned_thread(&self, owner: UserId, id: Ulid) -> Result<ChatThread> {
        self.store
            .get_thread(id)
            .await?
            .filter(|t| t.owner_id == owner)
            .ok_or_else(|| RagError::ThreadNotFound { id: id.to_string() })
    }

    // Collections

    /// Create a new collection.
    pub async fn create_collection(&self, owner: UserId, params: CollectionParams) -> ToolResult {
        let name = params.name.trim();
        if name.is_empty() {
            return ToolResult::error("Collection name required.");
        }

        info!("Creating collection: {}", name);
        let description = params.description.as_deref().map(str::trim);
        let collection = Collection::new(owner, name, description);
        let id = collection.id;

        match self.store.create_collection(collection).await {
            Ok(()) => ToolResult::success(format!("Collection '{}' created.", name)).with_id(id),
            Err(e) => ToolResult::error(format!("Failed to create collection: {}", e)),
        }
    }

    /// List the owner's collections, newest first.
    pub async fn list_collections(&self, owner: UserId) -> ToolResult {
        match self.store.list_collections(owner).await {
            Ok(collections) => render_collections(&collections),
            Err(e) => ToolResult::error(format!("Failed to list collections: {}", e)),
        }
    }

    /// List the owner's collections that can answer questions.
    pub async fn list_collections_with_processed(&self, owner: UserId) -> ToolResult {
        match self.store.list_collections_with_processed(owner).await {
            Ok(collections) => render_collections(&collections),
            Err(e) => ToolResult::error(format!("Failed to list collections: {}", e)),
        }
    }

    /// Collection detail with its documents, newest first.
    pub async fn show_collection(&self, owner: UserId, id: Ulid) -> ToolResult {
        let result = async {
            let collection = self.owned_collection(owner, id).await?;
            let documents = self.store.list_documents(collection.id).await?;

            let mut output = format!("{} ({})\n", collection.name, collection.id);
            if !collection.description.is_empty() {
                output.push_str(&format!("{}\n", collection.description));
            }
            output.push_str(&format!("\n{} documents:\n", documents.len()));

            for doc in documents {
                let state = if doc.processed {
                    format!("processed, {} chunks", doc.chunk_count)
                } else {
                    "not processed".to_string()
                };
                output.push_str(&format!(
                    "- {} ({}) [{}, {} bytes]\n",
                    doc.filename, doc.id, state, doc.size_bytes
                ));
            }
            Ok::<_, RagError>(output)
        }
        .await;

        match result {
            Ok(output) => ToolResult::success(output).with_id(id),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    /// Delete a collection with its documents, chunks, index namespace and
    /// stored files.
    pub async fn delete_collection(&self, owner: UserId, id: Ulid) -> ToolResult {
        let result = async {
            let collection = self.owned_collection(owner, id).await?;
            info!("Deleting collection: {} ({})", collection.name, collection.id);

            for doc in self.store.list_documents(collection.id).await? {
                if let Err(e) = self.blobs.delete(&doc.storage_key).await {
                    warn!("Failed to delete file of {}: {}", doc.id, e);
                }
            }
            if let Err(e) = self.index.drop_namespace(&collection.namespace()).await {
                warn!("Failed to drop namespace {}: {}", collection.namespace(), e);
            }
            self.store.delete_collection(collection.id).await?;

            Ok::<_, RagError>(collection.name)
        }
        .await;

        match result {
            Ok(name) => ToolResult::success(format!("Collection '{}' deleted.", name)).with_id(id),
            Err(e) => ToolResult::error(format!("Failed to delete collection: {}", e)),
        }
    }

    // Documents

    /// Store an uploaded file in a collection and ingest it immediately.
    pub async fn upload_document(
        &self,
        owner: UserId,
        collection_id: Ulid,
        filename: &str,
        bytes: &[u8],
    ) -> ToolResult {
        let collection = match self.owned_collection(owner, collection_id).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let filename = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let Some(file_type) = FileType::from_filename(filename) else {
            let extension = Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string();
            return ToolResult::error(RagError::UnsupportedFileType { extension }.to_string());
        };
        if bytes.len() as u64 > self.upload.max_file_bytes {
            return ToolResult::error(format!(
                "File too large: {} bytes (limit {} bytes)",
                bytes.len(),
                self.upload.max_file_bytes
            ));
        }

        let mut doc = Document::new(collection.id, filename, "", file_type, bytes.len() as u64);
        doc.storage_key = format!("documents/{}/{}.{}", collection.id, doc.id, file_type);
        let doc_id = doc.id;

        if let Err(e) = self.blobs.write(&doc.storage_key, bytes).await {
            return ToolResult::error(format!("Failed to store file: {}", e));
        }
        let storage_key = doc.storage_key.clone();
        if let Err(e) = self.store.insert_document(doc).await {
            if let Err(cleanup) = self.blobs.delete(&storage_key).await {
                warn!("Failed to remove blob {}: {}", storage_key, cleanup);
            }
            return ToolResult::error(format!("Failed to register document: {}", e));
        }

        info!("Uploaded {} into {} ({} bytes)", filename, collection.name, bytes.len());
        self.run_ingest(doc_id, filename, "uploaded").await
    }

    /// Run ingestion again for a stored document.
    pub async fn reingest(&self, owner: UserId, document_id: Ulid) -> ToolResult {
        match self.owned_document(owner, document_id).await {
            Ok((doc, _)) => self.run_ingest(doc.id, &doc.filename, "reingested").await,
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    async fn run_ingest(&self, document_id: Ulid, filename: &str, verb: &str) -> ToolResult {
        match self.pipeline.ingest(document_id).await {
            Ok(IngestOutcome::Processed(report)) => {
                let mut message = format!(
                    "Document '{}' {} and processed: {} chunks, {} with vectors.",
                    filename, verb, report.chunk_count, report.vectors_indexed
                );
                if report.embedding_failures > 0 {
                    message.push_str(&format!(" {} chunks could not be embedded.", report.embedding_failures));
                }
                ToolResult::success(message).with_id(document_id)
            }
            Ok(IngestOutcome::Failed { reason }) => ToolResult::success(format!(
                "Document '{}' {} but processing failed: {}.",
                filename, verb, reason
            ))
            .with_id(document_id),
            Err(e) => ToolResult::error(format!(
                "Document '{}' {} but processing failed: {}",
                filename, verb, e
            ))
            .with_id(document_id),
        }
    }

    /// Delete a document with its chunks, index records and stored file.
    pub async fn delete_document(&self, owner: UserId, document_id: Ulid) -> ToolResult {
        let result = async {
            let (doc, collection) = self.owned_document(owner, document_id).await?;

            if let Err(e) = self.blobs.delete(&doc.storage_key).await {
                warn!("Failed to delete file of {}: {}", doc.id, e);
            }
            if let Err(e) = self.index.delete_document(&collection.namespace(), doc.id).await {
                warn!("Failed to delete index records of {}: {}", doc.id, e);
            }
            self.store.delete_document(doc.id).await?;

            info!("Deleted document: {} ({})", doc.filename, doc.id);
            Ok::<_, RagError>(doc.filename)
        }
        .await;

        match result {
            Ok(filename) => ToolResult::success(format!("Document '{}' deleted.", filename)).with_id(document_id),
            Err(e) => ToolResult::error(format!("Failed to delete document: {}", e)),
        }
    }

    // Retrieval

    /// Answer a question from a collection's documents.
    pub async fn ask(&self, owner: UserId, params: AskParams) -> ToolResult {
        if params.query.trim().is_empty() {
            return ToolResult::error("Question required.");
        }

        let answer = self.composer.answer(&params.query, params.collection_id, owner).await;
        let output = format!("{}{}", answer.text, render_sources(&answer.sources));

        if answer.status == AnswerStatus::Failed {
            ToolResult::error(output)
        } else {
            ToolResult::success(output)
        }
    }

    // Threads

    /// Start a new, untitled conversation.
    pub async fn create_thread(&self, owner: UserId) -> ToolResult {
        let thread = ChatThread::new(owner);
        let id = thread.id;

        match self.store.create_thread(thread).await {
            Ok(()) => ToolResult::success(format!("Conversation {} created.", id)).with_id(id),
            Err(e) => ToolResult::error(format!("Failed to create conversation: {}", e)),
        }
    }

    /// The owner's most recently active conversations.
    pub async fn list_threads(&self, owner: UserId) -> ToolResult {
        match self.store.list_threads(owner, THREAD_LIST_LIMIT).await {
            Ok(threads) if threads.is_empty() => ToolResult::success("No conversations found."),
            Ok(threads) => {
                let mut output = format!("Found {} conversations:\n\n", threads.len());
                for thread in threads {
                    output.push_str(&format!("- {} ({})\n", thread.display_title(), thread.id));
                }
                ToolResult::success(output)
            }
            Err(e) => ToolResult::error(format!("Failed to list conversations: {}", e)),
        }
    }

    /// A conversation's messages, oldest first.
    pub async fn show_thread(&self, owner: UserId, id: Ulid) -> ToolResult {
        let result = async {
            let thread = self.owned_thread(owner, id).await?;
            let messages = self.store.list_messages(thread.id).await?;

            let mut output = format!("{}\n\n", thread.display_title());
            for message in &messages {
                output.push_str(&render_message(message));
                output.push('\n');
            }
            Ok::<_, RagError>(output)
        }
        .await;

        match result {
            Ok(output) => ToolResult::success(output).with_id(id),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    /// Delete a conversation and its messages.
    pub async fn delete_thread(&self, owner: UserId, id: Ulid) -> ToolResult {
        let result = async {
            let thread = self.owned_thread(owner, id).await?;
            self.store.delete_thread(thread.id).await
        }
        .await;

        match result {
            Ok(()) => ToolResult::success("Conversation deleted.").with_id(id),
            Err(e) => ToolResult::error(format!("Failed to delete conversation: {}", e)),
        }
    }

    /// Delete every conversation of the owner.
    pub async fn clear_threads(&self, owner: UserId) -> ToolResult {
        match self.store.delete_threads_for_owner(owner).await {
            Ok(count) => {
                info!("Cleared {} conversations of user {}", count, owner);
                ToolResult::success(format!("Deleted {} conversations.", count))
            }
            Err(e) => ToolResult::error(format!("Failed to clear conversations: {}", e)),
        }
    }

    /// Send a message and return the reply.
    pub async fn send_message(&self, owner: UserId, params: SendParams) -> ToolResult {
        let mode = match params.collection_id {
            Some(collection_id) => ChatMode::Rag { collection_id },
            None => ChatMode::Plain,
        };

        match self
            .orchestrator
            .send_message(params.thread_id, owner, &params.content, mode)
            .await
        {
            Ok(exchange) => {
                let reply = &exchange.assistant_message;
                ToolResult::success(format!("{}{}", reply.content, render_sources(&reply.sources)))
                    .with_id(reply.id)
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    // Stats

    /// Store statistics, plus index record counts when scoped to an owner.
    pub async fn stats(&self, owner: Option<UserId>) -> ToolResult {
        let stats = match self.store.get_stats(owner).await {
            Ok(stats) => stats,
            Err(e) => return ToolResult::error(format!("Failed to get stats: {}", e)),
        };

        let mut output = match owner {
            Some(user) => format!("Statistics for user {}:\n\n", user),
            None => "Overall statistics:\n\n".to_string(),
        };

        output.push_str(&format!("- Collections: {}\n", stats.collections));
        output.push_str(&format!(
            "- Documents: {} ({} processed)\n",
            stats.documents, stats.processed_documents
        ));
        output.push_str(&format!("- Chunks: {}\n", stats.chunks));
        output.push_str(&format!("- Conversations: {}\n", stats.threads));
        output.push_str(&format!("- Messages: {}\n", stats.messages));
        output.push_str(&format!(
            "- Storage: {:.2} MB\n",
            stats.storage_bytes as f64 / 1024.0 / 1024.0
        ));

        if let Some(user) = owner {
            match self.index_count(user).await {
                Ok(count) => output.push_str(&format!(
                    "- Index records: {} ({} with vectors)\n",
                    count.records, count.with_vectors
                )),
                Err(e) => warn!("Failed to count index records: {}", e),
            }
        }

        ToolResult::success(output)
    }

    async fn index_count(&self, owner: UserId) -> Result<IndexCount> {
        let mut total = IndexCount::default();
        for collection in self.store.list_collections(owner).await? {
            let count = self.index.count(&collection.namespace()).await?;
            total.records += count.records;
            total.with_vectors += count.with_vectors;
        }
        Ok(total)
    }
}

fn render_collections(collections: &[Collection]) -> ToolResult {
    if collections.is_empty() {
        return ToolResult::success("No collections found.");
    }

    let mut output = format!("Found {} collections:\n\n", collections.len());
    for coll in collections {
        let description = if coll.description.is_empty() {
            "(no description)"
        } else {
            coll.description.as_str()
        };
        output.push_str(&format!("- {} ({}): {}\n", coll.name, coll.id, description));
    }
    ToolResult::success(output)
}

fn render_sources(sources: &[Source]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut output = String::from("\n\nSources:\n");
    for source in sources {
        output.push_str(&format!("- {} (chunk {})\n", source.filename, source.chunk_index));
    }
    output
}

fn render_message(message: &Message) -> String {
    let author = match (message.role, message.is_rag_response) {
        (Role::User, _) => "You",
        (Role::Assistant, true) => "Assistant (documents)",
        (Role::Assistant, false) => "Assistant",
    };
    format!("{}: {}{}\n", author, message.content, render_sources(&message.sources))
}
