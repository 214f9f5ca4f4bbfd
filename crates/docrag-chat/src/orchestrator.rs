//! Conversation orchestrator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use ulid::Ulid;

use docrag_core::{
    ChatConfig, ChatMessage, ChatThread, CompletionClient, CompletionParams, Message, RagError,
    Result, Store, UserId,
};
use docrag_query::AnswerComposer;

/// How a message should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChatMode {
    /// Plain conversation with history.
    Plain,

    /// Answer from the documents of a collection.
    Rag { collection_id: Ulid },
}

/// A persisted user turn and its reply.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user_message: Message,
    pub assistant_message: Message,

    /// Thread title after the exchange.
    pub thread_title: Option<String>,
}

/// Title derived from a thread's first user message.
pub fn thread_title(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Drives one message-send request end to end.
pub struct ConversationOrchestrator {
    store: Arc<dyn Store>,
    composer: Arc<AnswerComposer>,
    llm: Arc<dyn CompletionClient>,
    config: ChatConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        composer: Arc<AnswerComposer>,
        llm: Arc<dyn CompletionClient>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            composer,
            llm,
            config,
        }
    }

    /// Persist `content` as a user turn in `thread_id`, answer it, and
    /// persist the answer.
    ///
    /// The user message is kept even when the reply cannot be produced or
    /// persisted; that case returns `RagError::Orchestration`.
    pub async fn send_message(
        &self,
        thread_id: Ulid,
        owner: UserId,
        content: &str,
        mode: ChatMode,
    ) -> Result<Exchange> {
        let content = content.trim();
        if content.is_empty() {
            return Err(RagError::invalid_argument("Message required."));
        }

        let thread = self
            .store
            .get_thread(thread_id)
            .await?
            .filter(|t| t.owner_id == owner)
            .ok_or_else(|| RagError::ThreadNotFound {
                id: thread_id.to_string(),
            })?;

        let user_message = Message::user(thread.id, content);
        self.store.insert_message(&user_message).await?;
        debug!("Stored user message {} in thread {}", user_message.id, thread.id);

        let thread_title = self.assign_title(&thread, content).await?;

        let assistant_message = match self.reply(&thread, &user_message, mode, owner).await {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to answer message in thread {}: {}", thread.id, e);
                return Err(RagError::orchestration(e.to_string()));
            }
        };

        info!(
            "Exchange stored in thread {} ({})",
            thread.id,
            if assistant_message.is_rag_response { "rag" } else { "plain" }
        );

        Ok(Exchange {
            user_message,
            assistant_message,
            thread_title,
        })
    }

    /// Title the thread from its first user message; never overwrites.
    async fn assign_title(&self, thread: &ChatThread, content: &str) -> Result<Option<String>> {
        if thread.title.is_some() {
            return Ok(thread.title.clone());
        }

        if self.store.count_user_messages(thread.id).await? == 1 {
            let title = thread_title(content, self.config.title_max_chars);
            if self.store.set_thread_title_if_unset(thread.id, &title).await? {
                debug!("Titled thread {}: {:?}", thread.id, title);
                return Ok(Some(title));
            }
        }

        Ok(self.store.get_thread(thread.id).await?.and_then(|t| t.title))
    }

    /// Produce and persist the assistant message.
    async fn reply(
        &self,
        thread: &ChatThread,
        user_message: &Message,
        mode: ChatMode,
        owner: UserId,
    ) -> Result<Message> {
        let message = match mode {
            ChatMode::Rag { collection_id } => {
                let answer = self
                    .composer
                    .answer(&user_message.content, collection_id, owner)
                    .await;
                Message::rag_answer(thread.id, &answer.text, answer.sources)
            }
            ChatMode::Plain => {
                let prompt = self.plain_prompt(thread.id, user_message).await?;
                let params = CompletionParams {
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                };

                match self.llm.complete(&prompt, params).await {
                    Ok(text) => Message::assistant(thread.id, &text),
                    Err(e) => {
                        error!("Completion failed in thread {}: {}", thread.id, e);
                        Message::assistant(thread.id, &format!("Sorry, I encountered an error: {}", e))
                    }
                }
            }
        };

        self.store.insert_message(&message).await?;
        Ok(message)
    }

    /// System instruction, the history window in chronological order, then
    /// the new user turn.
    async fn plain_prompt(&self, thread_id: Ulid, user_message: &Message) -> Result<Vec<ChatMessage>> {
        let window = self.config.history_window as usize;

        // Newest first, including the message just stored
        let recent = self
            .store
            .recent_messages(thread_id, self.config.history_window + 1)
            .await?;

        let mut history: Vec<&Message> = recent
            .iter()
            .filter(|m| m.id != user_message.id)
            .take(window)
            .collect();
        history.reverse();

        let mut prompt = Vec::with_capacity(history.len() + 2);
        prompt.push(ChatMessage::system(self.config.system_prompt.clone()));
        prompt.extend(history.into_iter().map(ChatMessage::from));
        prompt.push(ChatMessage::user(user_message.content.clone()));
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docrag_core::{
        ChatRole, ChunkMetadata, Collection, Document, DocumentChunk, FileType, RetrievalConfig,
        Role, Stats, VectorIndex, VectorRecord,
    };
    use docrag_llm::MockCompletionClient;
    use docrag_store::{SqliteStore, SqliteVectorIndex};

    const OWNER: UserId = 1;

    struct Fixture {
        store: Arc<SqliteStore>,
        index: Arc<SqliteVectorIndex>,
        llm: Arc<MockCompletionClient>,
        thread: ChatThread,
    }

    impl Fixture {
        async fn new(llm: MockCompletionClient) -> Self {
            let store = Arc::new(SqliteStore::open_memory().unwrap());
            let thread = ChatThread::new(OWNER);
            store.create_thread(thread.clone()).await.unwrap();

            Self {
                store,
                index: Arc::new(SqliteVectorIndex::open_memory().unwrap()),
                llm: Arc::new(llm),
                thread,
            }
        }

        fn orchestrator_with(&self, store: Arc<dyn Store>, config: ChatConfig) -> ConversationOrchestrator {
            let composer = AnswerComposer::new(
                store.clone(),
                self.index.clone(),
                None,
                self.llm.clone(),
                RetrievalConfig::default(),
            );
            ConversationOrchestrator::new(store, Arc::new(composer), self.llm.clone(), config)
        }

        fn orchestrator(&self) -> ConversationOrchestrator {
            self.orchestrator_with(self.store.clone(), ChatConfig::default())
        }

        async fn messages(&self) -> Vec<Message> {
            self.store.list_messages(self.thread.id).await.unwrap()
        }
    }

    #[test]
    fn test_thread_title() {
        assert_eq!(thread_title("Short question", 50), "Short question");
        assert_eq!(thread_title(&"x".repeat(50), 50), "x".repeat(50));
        assert_eq!(thread_title("héllo wörld", 5), "héllo...");
    }

    #[tokio::test]
    async fn test_title_set_once_from_first_message() {
        let fx = Fixture::new(MockCompletionClient::new("Hi!")).await;
        let orchestrator = fx.orchestrator();
        let first = "Hello there, this is a test message that exceeds fifty characters for sure";

        let exchange = orchestrator
            .send_message(fx.thread.id, OWNER, first, ChatMode::Plain)
            .await
            .unwrap();
        let expected = format!("{}...", &first[..50]);
        assert_eq!(exchange.thread_title.as_deref(), Some(expected.as_str()));

        let exchange = orchestrator
            .send_message(fx.thread.id, OWNER, "A second, different message", ChatMode::Plain)
            .await
            .unwrap();
        assert_eq!(exchange.thread_title.as_deref(), Some(expected.as_str()));

        let thread = fx.store.get_thread(fx.thread.id).await.unwrap().unwrap();
        assert_eq!(thread.title, Some(expected));
    }

    #[tokio::test]
    async fn test_message_whitespace_trimmed() {
        let fx = Fixture::new(MockCompletionClient::new("Hi!")).await;
        let orchestrator = fx.orchestrator();

        let exchange = orchestrator
            .send_message(fx.thread.id, OWNER, "  \n Hello there \t\n", ChatMode::Plain)
            .await
            .unwrap();
        assert_eq!(exchange.user_message.content, "Hello there");
        assert_eq!(exchange.thread_title.as_deref(), Some("Hello there"));

        let messages = fx.messages().await;
        assert_eq!(messages[0].content, "Hello there");
        let call = fx.llm.last_call().unwrap();
        assert_eq!(call.messages.last().unwrap().content, "Hello there");
    }

    #[tokio::test]
    async fn test_plain_prompt_has_windowed_history() {
        let fx = Fixture::new(MockCompletionClient::new("ok")).await;
        let config = ChatConfig {
            history_window: 2,
            ..Default::default()
        };
        let orchestrator = fx.orchestrator_with(fx.store.clone(), config);

        for text in ["one", "two", "three"] {
            orchestrator
                .send_message(fx.thread.id, OWNER, text, ChatMode::Plain)
                .await
                .unwrap();
        }

        let call = fx.llm.last_call().unwrap();
        let roles: Vec<ChatRole> = call.messages.iter().map(|m| m.role).collect();
        let contents: Vec<&str> = call.messages.iter().map(|m| m.content.as_str()).collect();

        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(contents, vec!["You are a helpful AI assistant.", "two", "ok", "three"]);
        assert_eq!(call.params.max_tokens, 1000);
        assert!((call.params.temperature - 0.7).abs() < f32::EPSILON);

        assert_eq!(fx.messages().await.len(), 6);
    }

    #[tokio::test]
    async fn test_completion_failure_is_answered_with_apology() {
        let fx = Fixture::new(MockCompletionClient::default().then_fail("rate limited")).await;

        let exchange = fx
            .orchestrator()
            .send_message(fx.thread.id, OWNER, "Hello", ChatMode::Plain)
            .await
            .unwrap();

        assert!(exchange
            .assistant_message
            .content
            .starts_with("Sorry, I encountered an error:"));

        let messages = fx.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_rag_mode_persists_sources() {
        let fx = Fixture::new(MockCompletionClient::new("Refunds take 30 days.")).await;

        let collection = Collection::new(OWNER, "Policies", None);
        fx.store.create_collection(collection.clone()).await.unwrap();
        let doc = Document::new(collection.id, "policy.txt", "documents/policy.txt", FileType::Txt, 40);
        let doc_id = doc.id;
        fx.store.insert_document(doc).await.unwrap();
        fx.store
            .mark_document_processed(doc_id, 1, &collection.namespace())
            .await
            .unwrap();
        fx.index.ensure_namespace(&collection.namespace()).await.unwrap();
        fx.index
            .insert(
                &collection.namespace(),
                VectorRecord::new(
                    ChunkMetadata {
                        document_id: doc_id,
                        chunk_index: 0,
                        filename: "policy.txt".to_string(),
                        page_number: None,
                    },
                    "Refunds are issued within 30 days.",
                    None,
                ),
            )
            .await
            .unwrap();

        let exchange = fx
            .orchestrator()
            .send_message(
                fx.thread.id,
                OWNER,
                "How long do refunds take?",
                ChatMode::Rag {
                    collection_id: collection.id,
                },
            )
            .await
            .unwrap();

        let reply = &exchange.assistant_message;
        assert!(reply.is_rag_response);
        assert_eq!(reply.content, "Refunds take 30 days.");
        assert_eq!(reply.sources.len(), 1);
        assert_eq!(reply.sources[0].filename, "policy.txt");

        let stored = fx.messages().await;
        assert_eq!(stored.len(), 2);
        assert!(stored[1].is_rag_response);
        assert_eq!(stored[1].sources, reply.sources);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_foreign_requests() {
        let fx = Fixture::new(MockCompletionClient::default()).await;
        let orchestrator = fx.orchestrator();

        let err = orchestrator
            .send_message(fx.thread.id, OWNER, "   ", ChatMode::Plain)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument { .. }));

        let err = orchestrator
            .send_message(fx.thread.id, OWNER + 1, "Hello", ChatMode::Plain)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ThreadNotFound { .. }));

        assert!(fx.messages().await.is_empty());
        assert_eq!(fx.llm.call_count(), 0);
    }

    /// Delegates to SQLite but refuses to store assistant messages.
    struct RejectingStore(Arc<SqliteStore>);

    #[async_trait]
    impl Store for RejectingStore {
        async fn create_collection(&self, collection: Collection) -> Result<()> {
            self.0.create_collection(collection).await
        }
        async fn get_collection(&self, id: Ulid) -> Result<Option<Collection>> {
            self.0.get_collection(id).await
        }
        async fn list_collections(&self, owner_id: UserId) -> Result<Vec<Collection>> {
            self.0.list_collections(owner_id).await
        }
        async fn list_collections_with_processed(&self, owner_id: UserId) -> Result<Vec<Collection>> {
            self.0.list_collections_with_processed(owner_id).await
        }
        async fn delete_collection(&self, id: Ulid) -> Result<()> {
            self.0.delete_collection(id).await
        }
        async fn insert_document(&self, doc: Document) -> Result<()> {
            self.0.insert_document(doc).await
        }
        async fn get_document(&self, id: Ulid) -> Result<Option<Document>> {
            self.0.get_document(id).await
        }
        async fn list_documents(&self, collection_id: Ulid) -> Result<Vec<Document>> {
            self.0.list_documents(collection_id).await
        }
        async fn count_processed_documents(&self, collection_id: Ulid) -> Result<u64> {
            self.0.count_processed_documents(collection_id).await
        }
        async fn mark_document_processed(&self, id: Ulid, chunk_count: u32, namespace: &str) -> Result<()> {
            self.0.mark_document_processed(id, chunk_count, namespace).await
        }
        async fn mark_document_unprocessed(&self, id: Ulid) -> Result<()> {
            self.0.mark_document_unprocessed(id).await
        }
        async fn delete_document(&self, id: Ulid) -> Result<()> {
            self.0.delete_document(id).await
        }
        async fn insert_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
            self.0.insert_chunk(chunk).await
        }
        async fn get_chunks_for_document(&self, document_id: Ulid) -> Result<Vec<DocumentChunk>> {
            self.0.get_chunks_for_document(document_id).await
        }
        async fn delete_chunks_for_document(&self, document_id: Ulid) -> Result<u64> {
            self.0.delete_chunks_for_document(document_id).await
        }
        async fn create_thread(&self, thread: ChatThread) -> Result<()> {
            self.0.create_thread(thread).await
        }
        async fn get_thread(&self, id: Ulid) -> Result<Option<ChatThread>> {
            self.0.get_thread(id).await
        }
        async fn list_threads(&self, owner_id: UserId, limit: u32) -> Result<Vec<ChatThread>> {
            self.0.list_threads(owner_id, limit).await
        }
        async fn set_thread_title_if_unset(&self, id: Ulid, title: &str) -> Result<bool> {
            self.0.set_thread_title_if_unset(id, title).await
        }
        async fn delete_thread(&self, id: Ulid) -> Result<()> {
            self.0.delete_thread(id).await
        }
        async fn delete_threads_for_owner(&self, owner_id: UserId) -> Result<u64> {
            self.0.delete_threads_for_owner(owner_id).await
        }
        async fn insert_message(&self, message: &Message) -> Result<()> {
            if message.role == Role::Assistant {
                return Err(RagError::database("disk full"));
            }
            self.0.insert_message(message).await
        }
        async fn list_messages(&self, thread_id: Ulid) -> Result<Vec<Message>> {
            self.0.list_messages(thread_id).await
        }
        async fn recent_messages(&self, thread_id: Ulid, limit: u32) -> Result<Vec<Message>> {
            self.0.recent_messages(thread_id, limit).await
        }
        async fn count_user_messages(&self, thread_id: Ulid) -> Result<u64> {
            self.0.count_user_messages(thread_id).await
        }
        async fn get_stats(&self, owner_id: Option<UserId>) -> Result<Stats> {
            self.0.get_stats(owner_id).await
        }
    }

    #[tokio::test]
    async fn test_user_message_kept_when_reply_cannot_be_stored() {
        let fx = Fixture::new(MockCompletionClient::new("Hi!")).await;
        let store: Arc<dyn Store> = Arc::new(RejectingStore(fx.store.clone()));
        let orchestrator = fx.orchestrator_with(store, ChatConfig::default());

        let err = orchestrator
            .send_message(fx.thread.id, OWNER, "Hello", ChatMode::Plain)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ORCHESTRATION_ERROR");

        let messages = fx.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);

        // Title survives the failed reply
        let thread = fx.store.get_thread(fx.thread.id).await.unwrap().unwrap();
        assert_eq!(thread.title.as_deref(), Some("Hello"));
    }
}
