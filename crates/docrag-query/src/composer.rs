//! Retrieval and answer composition.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use ulid::Ulid;

use docrag_core::{
    ChatMessage, Collection, CompletionClient, CompletionParams, Embedder, IndexQuery, RagError,
    Result, RetrievalConfig, Store, UserId, VectorHit, VectorIndex,
};

use crate::answer::{AnswerStatus, RagAnswer};
use crate::context::{build_prompt, dedup_sources};

/// Answers questions against a collection's indexed chunks.
///
/// Every path returns a [`RagAnswer`]; failures become an error-message
/// answer with no sources.
pub struct AnswerComposer {
    store: Arc<dyn Store>,
    index: Arc<dyn VectorIndex>,

    /// Without an embedder, retrieval runs in text mode.
    embedder: Option<Arc<dyn Embedder>>,

    llm: Arc<dyn CompletionClient>,
    config: RetrievalConfig,
}

impl AnswerComposer {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn VectorIndex>,
        embedder: Option<Arc<dyn Embedder>>,
        llm: Arc<dyn CompletionClient>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            llm,
            config,
        }
    }

    /// Answer `query` from the documents of `collection_id`, which must be
    /// owned by `user`.
    pub async fn answer(&self, query: &str, collection_id: Ulid, user: UserId) -> RagAnswer {
        let start = Instant::now();
        info!("Answering against collection {}: {:?}", collection_id, query);

        let answer = match self.compose(query, collection_id, user).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Failed to answer against collection {}: {}", collection_id, e);
                RagAnswer::failed(e)
            }
        };

        info!(
            "Answer composed in {}ms ({:?}, {} sources)",
            start.elapsed().as_millis(),
            answer.status,
            answer.sources.len()
        );
        answer
    }

    async fn compose(&self, query: &str, collection_id: Ulid, user: UserId) -> Result<RagAnswer> {
        let collection = self.resolve_collection(collection_id, user).await?;

        if self.store.count_processed_documents(collection.id).await? == 0 {
            debug!("Collection {} has no processed documents", collection.id);
            return Ok(RagAnswer::short_circuit(
                &self.config.no_documents_message,
                AnswerStatus::NoProcessedDocuments,
            ));
        }

        let hits = self.retrieve(query, &collection.namespace()).await?;
        if hits.is_empty() {
            debug!("No chunks retrieved from {}", collection.namespace());
            return Ok(RagAnswer::short_circuit(
                &self.config.no_results_message,
                AnswerStatus::NoRelevantChunks,
            ));
        }

        let context = &hits[..hits.len().min(self.config.context_chunks)];
        let prompt = build_prompt(context, query);
        debug!("Prompting with {} context chunks ({} bytes)", context.len(), prompt.len());

        let text = self
            .llm
            .complete(
                &[ChatMessage::user(prompt)],
                CompletionParams {
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                },
            )
            .await?;

        Ok(RagAnswer::answered(text, dedup_sources(context)))
    }

    async fn resolve_collection(&self, id: Ulid, user: UserId) -> Result<Collection> {
        self.store
            .get_collection(id)
            .await?
            .filter(|c| c.owner_id == user)
            .ok_or_else(|| RagError::CollectionNotFound { id: id.to_string() })
    }

    /// Top-k chunks by vector similarity, or by text relevance when there is
    /// no embedder or no record in the namespace carries a vector.
    async fn retrieve(&self, query: &str, namespace: &str) -> Result<Vec<VectorHit>> {
        let k = self.config.top_k;

        if let Some(embedder) = &self.embedder {
            let embedding = embedder.embed_query(query).await?;
            let hits = self
                .index
                .query(namespace, IndexQuery::Vector(&embedding), k)
                .await?;
            if !hits.is_empty() {
                debug!("Vector search returned {} hits", hits.len());
                return Ok(hits);
            }
            debug!("No vector hits in {}, trying text search", namespace);
        }

        let hits = self.index.query(namespace, IndexQuery::Text(query), k).await?;
        debug!("Text search returned {} hits", hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docrag_core::{ChatRole, ChunkMetadata, Document, FileType, Source, VectorRecord};
    use docrag_llm::MockCompletionClient;
    use docrag_store::{SqliteStore, SqliteVectorIndex};

    const OWNER: UserId = 1;

    /// Embeds every query as the same fixed vector.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_documents(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::embedding("offline"))
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::embedding("offline"))
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        index: Arc<SqliteVectorIndex>,
        llm: Arc<MockCompletionClient>,
        collection: Collection,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(SqliteStore::open_memory().unwrap());
            let index = Arc::new(SqliteVectorIndex::open_memory().unwrap());
            let collection = Collection::new(OWNER, "Policies", None);
            store.create_collection(collection.clone()).await.unwrap();
            index.ensure_namespace(&collection.namespace()).await.unwrap();

            Self {
                store,
                index,
                llm: Arc::new(MockCompletionClient::new("Refunds take 30 days.")),
                collection,
            }
        }

        /// Register a processed document.
        async fn processed_document(&self, filename: &str) -> Ulid {
            let doc = Document::new(
                self.collection.id,
                filename,
                &format!("documents/{}", filename),
                FileType::Pdf,
                100,
            );
            let id = doc.id;
            self.store.insert_document(doc).await.unwrap();
            self.store
                .mark_document_processed(id, 1, &self.collection.namespace())
                .await
                .unwrap();
            id
        }

        async fn index_chunk(
            &self,
            document_id: Ulid,
            filename: &str,
            chunk_index: u32,
            content: &str,
            embedding: Option<Vec<f32>>,
        ) {
            let record = VectorRecord::new(
                ChunkMetadata {
                    document_id,
                    chunk_index,
                    filename: filename.to_string(),
                    page_number: None,
                },
                content,
                embedding,
            );
            self.index
                .insert(&self.collection.namespace(), record)
                .await
                .unwrap();
        }

        fn composer(&self, embedder: Option<Arc<dyn Embedder>>) -> AnswerComposer {
            AnswerComposer::new(
                self.store.clone(),
                self.index.clone(),
                embedder,
                self.llm.clone(),
                RetrievalConfig::default(),
            )
        }
    }

    fn fixed() -> Option<Arc<dyn Embedder>> {
        Some(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])))
    }

    #[tokio::test]
    async fn test_no_processed_documents_skips_llm() {
        let fx = Fixture::new().await;

        // Uploaded but never processed
        let doc = Document::new(fx.collection.id, "draft.txt", "documents/draft.txt", FileType::Txt, 5);
        fx.store.insert_document(doc).await.unwrap();

        let answer = fx.composer(fixed()).answer("anything", fx.collection.id, OWNER).await;
        assert_eq!(answer.status, AnswerStatus::NoProcessedDocuments);
        assert_eq!(answer.text, "No processed documents found.");
        assert!(answer.sources.is_empty());
        assert_eq!(fx.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_hits_skips_llm() {
        let fx = Fixture::new().await;
        fx.processed_document("a.pdf").await;

        let answer = fx.composer(fixed()).answer("anything", fx.collection.id, OWNER).await;
        assert_eq!(answer.status, AnswerStatus::NoRelevantChunks);
        assert_eq!(answer.text, "No relevant information found.");
        assert!(answer.sources.is_empty());
        assert_eq!(fx.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_uses_top_chunks_and_dedups_sources() {
        let fx = Fixture::new().await;
        let a = fx.processed_document("a.pdf").await;
        let b = fx.processed_document("b.pdf").await;
        let c = fx.processed_document("c.pdf").await;

        fx.index_chunk(a, "a.pdf", 0, "first", Some(vec![1.0, 0.0, 0.0])).await;
        fx.index_chunk(a, "a.pdf", 1, "second", Some(vec![0.9, 0.1, 0.0])).await;
        fx.index_chunk(b, "b.pdf", 0, "third", Some(vec![0.8, 0.2, 0.0])).await;
        fx.index_chunk(c, "c.pdf", 0, "fourth", Some(vec![0.0, 1.0, 0.0])).await;

        let answer = fx
            .composer(fixed())
            .answer("What is the refund policy?", fx.collection.id, OWNER)
            .await;

        assert!(answer.is_answered());
        assert_eq!(answer.text, "Refunds take 30 days.");
        assert_eq!(
            answer.sources,
            vec![
                Source {
                    filename: "a.pdf".to_string(),
                    chunk_index: 0
                },
                Source {
                    filename: "b.pdf".to_string(),
                    chunk_index: 0
                },
            ]
        );

        let call = fx.llm.last_call().unwrap();
        assert_eq!(fx.llm.call_count(), 1);
        assert_eq!(call.messages.len(), 1);
        assert_eq!(call.messages[0].role, ChatRole::User);
        assert!(call.messages[0]
            .content
            .contains("Context: first\n\nsecond\n\nthird\n\nQuestion: What is the refund policy?"));
        assert!(!call.messages[0].content.contains("fourth"));
        assert_eq!(call.params.max_tokens, 1000);
        assert!((call.params.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_text_mode_without_embedder() {
        let fx = Fixture::new().await;
        let a = fx.processed_document("handbook.txt").await;
        fx.index_chunk(a, "handbook.txt", 0, "Refunds are issued within 30 days.", None).await;
        fx.index_chunk(a, "handbook.txt", 1, "Shipping is free over 50 dollars.", None).await;

        let answer = fx.composer(None).answer("refunds", fx.collection.id, OWNER).await;
        assert!(answer.is_answered());
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn test_text_fallback_when_no_vectors() {
        let fx = Fixture::new().await;
        let a = fx.processed_document("handbook.txt").await;
        fx.index_chunk(a, "handbook.txt", 0, "Refunds are issued within 30 days.", None).await;

        let answer = fx.composer(fixed()).answer("refunds", fx.collection.id, OWNER).await;
        assert!(answer.is_answered());
        assert_eq!(fx.llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_become_error_answers() {
        let fx = Fixture::new().await;
        let a = fx.processed_document("a.pdf").await;
        fx.index_chunk(a, "a.pdf", 0, "first", Some(vec![1.0, 0.0, 0.0])).await;

        // Query embedding fails
        let answer = fx
            .composer(Some(Arc::new(FailingEmbedder)))
            .answer("q", fx.collection.id, OWNER)
            .await;
        assert_eq!(answer.status, AnswerStatus::Failed);
        assert!(answer.text.starts_with("Error querying documents:"));
        assert!(answer.sources.is_empty());

        // Completion fails
        let llm = Arc::new(MockCompletionClient::default().then_fail("rate limited"));
        let composer = AnswerComposer::new(
            fx.store.clone(),
            fx.index.clone(),
            fixed(),
            llm.clone(),
            RetrievalConfig::default(),
        );
        let answer = composer.answer("q", fx.collection.id, OWNER).await;
        assert_eq!(answer.status, AnswerStatus::Failed);
        assert!(answer.text.contains("rate limited"));
        assert!(answer.sources.is_empty());
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_foreign_collection_is_not_found() {
        let fx = Fixture::new().await;
        let a = fx.processed_document("a.pdf").await;
        fx.index_chunk(a, "a.pdf", 0, "first", Some(vec![1.0, 0.0, 0.0])).await;

        let answer = fx.composer(fixed()).answer("q", fx.collection.id, OWNER + 1).await;
        assert_eq!(answer.status, AnswerStatus::Failed);
        assert!(answer.text.contains("Collection not found"));
        assert_eq!(fx.llm.call_count(), 0);
    }
}
