//! Document ingestion pipeline.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use ulid::Ulid;

use docrag_chunk::RecursiveChunker;
use docrag_core::{
    BlobStore, ChunkConfig, ChunkMetadata, Chunker, DocumentChunk, Embedder, RagError, Result,
    Store, VectorIndex, VectorRecord,
};
use docrag_extract::{ExtractedText, TextExtractor};

use crate::outcome::{IngestFailure, IngestOutcome, IngestReport};

/// Runs extraction, chunking, embedding and indexing for stored documents.
pub struct IngestionPipeline {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn VectorIndex>,

    /// Absent when no embedding model is available; records are then text-only.
    embedder: Option<Arc<dyn Embedder>>,

    chunker: Arc<dyn Chunker>,
    extractor: TextExtractor,
    chunk_config: ChunkConfig,
}

impl IngestionPipeline {
    /// Create a pipeline with the default character chunker.
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Option<Arc<dyn Embedder>>,
        chunk_config: ChunkConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            index,
            embedder,
            chunker: Arc::new(RecursiveChunker::new()),
            extractor: TextExtractor::new(),
            chunk_config,
        }
    }

    /// Whether chunks get embeddings.
    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Ingest a stored document.
    ///
    /// Re-ingesting marks the document unprocessed and clears its previous
    /// chunks and index records first, so a run that stops partway never
    /// leaves a processed document with missing chunks. A soft failure
    /// returns before anything is cleared.
    pub async fn ingest(&self, document_id: Ulid) -> Result<IngestOutcome> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| RagError::DocumentNotFound {
                id: document_id.to_string(),
            })?;
        let collection = self
            .store
            .get_collection(doc.collection_id)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound {
                id: doc.collection_id.to_string(),
            })?;

        info!("Ingesting document: {} ({})", doc.filename, doc.id);

        // 1. Extract
        let extracted = match self.blobs.read(&doc.storage_key).await {
            Ok(bytes) => self.extractor.extract_or_empty(doc.file_type, &bytes),
            Err(e) => {
                error!("Failed to read {} for document {}: {}", doc.storage_key, doc.id, e);
                ExtractedText::default()
            }
        };

        if extracted.is_empty() {
            warn!("No text extracted from {}, leaving it unprocessed", doc.filename);
            return Ok(IngestOutcome::failed(IngestFailure::ExtractionFailure));
        }

        // 2. Chunk
        let chunks = self.chunker.chunk(&extracted.text, &self.chunk_config)?;
        if chunks.is_empty() {
            warn!("No chunks produced for {}, leaving it unprocessed", doc.filename);
            return Ok(IngestOutcome::failed(IngestFailure::EmptyChunkSet));
        }

        // 3. Resolve the namespace and drop anything a previous run left behind
        let namespace = collection.namespace();

        if doc.processed {
            self.store.mark_document_unprocessed(doc.id).await?;
        }
        let cleared = self.store.delete_chunks_for_document(doc.id).await?;
        if cleared > 0 {
            debug!("Cleared {} previous chunks of {}", cleared, doc.id);
        }
        if let Err(e) = self.index.delete_document(&namespace, doc.id).await {
            warn!("Failed to clear previous index records of {}: {}", doc.id, e);
        }

        let index_ready = match self.index.ensure_namespace(&namespace).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Index namespace {} unavailable, storing chunks without index records: {}",
                    namespace, e
                );
                false
            }
        };

        // 4. Persist, embed and index each chunk in order
        let mut report = IngestReport {
            chunk_count: chunks.len() as u32,
            ..Default::default()
        };

        for (idx, data) in chunks.into_iter().enumerate() {
            let chunk = DocumentChunk {
                document_id: doc.id,
                chunk_index: idx as u32,
                page_number: data.offset.and_then(|offset| extracted.page_at(offset)),
                content: data.content,
            };
            self.store.insert_chunk(&chunk).await?;

            if !index_ready {
                report.index_failures += 1;
                continue;
            }

            let embedding = self.embed_chunk(&chunk, &mut report).await;
            let has_vector = embedding.is_some();
            let record = VectorRecord::new(
                ChunkMetadata {
                    document_id: doc.id,
                    chunk_index: chunk.chunk_index,
                    filename: doc.filename.clone(),
                    page_number: chunk.page_number,
                },
                &chunk.content,
                embedding,
            );

            match self.index.insert(&namespace, record).await {
                Ok(()) if has_vector => report.vectors_indexed += 1,
                Ok(()) => report.text_only_records += 1,
                Err(e) => {
                    warn!("Failed to index chunk {} of {}: {}", chunk.chunk_index, doc.id, e);
                    report.index_failures += 1;
                }
            }
        }

        // 5. Mark processed
        self.store
            .mark_document_processed(doc.id, report.chunk_count, &namespace)
            .await?;

        info!(
            "Processed {}: {} chunks, {} vectors, {} text-only, {} embedding failures",
            doc.filename,
            report.chunk_count,
            report.vectors_indexed,
            report.text_only_records,
            report.embedding_failures
        );

        Ok(IngestOutcome::Processed(report))
    }

    /// Embed one chunk; failures are counted and yield no vector.
    async fn embed_chunk(&self, chunk: &DocumentChunk, report: &mut IngestReport) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;

        match embedder.embed_documents(&[chunk.content.as_str()]).await {
            Ok(mut vectors) if !vectors.is_empty() && !vectors[0].is_empty() => {
                Some(vectors.swap_remove(0))
            }
            Ok(_) => {
                warn!(
                    "Embedder returned no vector for chunk {} of {}",
                    chunk.chunk_index, chunk.document_id
                );
                report.embedding_failures += 1;
                None
            }
            Err(e) => {
                warn!(
                    "Failed to embed chunk {} of {}: {}",
                    chunk.chunk_index, chunk.document_id, e
                );
                report.embedding_failures += 1;
                None
            }
        }
    }
}
