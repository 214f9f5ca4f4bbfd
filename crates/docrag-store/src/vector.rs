//! Namespaced vector index stored in SQLite.
//!
//! Embeddings are kept as little-endian `f32` blobs and searched by brute
//! force cosine similarity within a namespace. Records without an embedding
//! are still searchable through the FTS5 table, which backs text queries.

use std::cmp::Ordering;
use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tracing::debug;
use ulid::Ulid;

use docrag_core::{
    now_millis, ChunkMetadata, IndexCount, IndexQuery, RagError, Result, VectorHit, VectorIndex,
    VectorRecord,
};

use crate::connection::{db_err, get_ulid, Database};
use crate::schema::INDEX_SCHEMA;

/// A stored record as read back for scoring.
struct StoredRecord {
    id: String,
    content: String,
    metadata: ChunkMetadata,
    embedding: Option<Vec<f32>>,
}

/// SQLite-backed vector index.
pub struct SqliteVectorIndex {
    db: Database,
}

impl SqliteVectorIndex {
    /// Open or create an index database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout_ms: u32) -> Result<Self> {
        Ok(Self {
            db: Database::open(path.as_ref(), INDEX_SCHEMA, busy_timeout_ms)?,
        })
    }

    /// Open an in-memory index (for testing).
    pub fn open_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_memory(INDEX_SCHEMA)?,
        })
    }

    /// Names of all namespaces.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM namespaces ORDER BY name")
                .map_err(db_err)?;
            let names = stmt
                .query_map([], |row| row.get(0))
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(db_err)?;
            Ok(names)
        })
    }

    fn vector_search(&self, namespace: &str, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if query.is_empty() || query.iter().any(|x| !x.is_finite()) {
            return Err(RagError::index("query vector must be non-empty and finite"));
        }

        let records = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, document_id, chunk_index, filename, page_number, content, embedding
                    FROM vector_records
                    WHERE namespace = ?1 AND embedding IS NOT NULL
                    ORDER BY rowid
                    "#,
                )
                .map_err(db_err)?;

            let records = stmt
                .query_map(params![namespace], row_to_record)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(records)
        })?;

        let mut hits: Vec<VectorHit> = records
            .into_iter()
            .filter_map(|record| {
                let embedding = record.embedding.as_deref()?;
                if embedding.len() != query.len() {
                    debug!(
                        "Skipping record {} with dimension {} (query has {})",
                        record.id,
                        embedding.len(),
                        query.len()
                    );
                    return None;
                }
                let score = cosine_similarity(query, embedding);
                Some(VectorHit {
                    id: record.id,
                    score,
                    content: record.content,
                    metadata: record.metadata,
                })
            })
            .collect();

        // Stable sort keeps insertion order for ties
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    fn text_search(&self, namespace: &str, query: &str, k: usize) -> Result<Vec<VectorHit>> {
        let Some(fts_query) = fts5_query(query) else {
            return Ok(Vec::new());
        };

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT r.id, r.document_id, r.chunk_index, r.filename, r.page_number,
                           r.content, r.embedding, bm25(vector_records_fts) AS score
                    FROM vector_records_fts f
                    JOIN vector_records r ON r.rowid = f.rowid
                    WHERE vector_records_fts MATCH ?1
                    AND r.namespace = ?2
                    ORDER BY score
                    LIMIT ?3
                    "#,
                )
                .map_err(db_err)?;

            let hits = stmt
                .query_map(params![fts_query, namespace, k as i64], |row| {
                    let record = row_to_record(row)?;
                    let bm25: f64 = row.get(7)?;
                    Ok(VectorHit {
                        id: record.id,
                        score: (-bm25) as f32,
                        content: record.content,
                        metadata: record.metadata,
                    })
                })
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(hits)
        })
    }

    fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM namespaces WHERE name = ?1",
                    params![namespace],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            Ok(found.is_some())
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        if namespace.is_empty() {
            return Err(RagError::index("namespace name must not be empty"));
        }

        self.db.with_conn(|conn| {
            let created = conn
                .execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![namespace, now_millis() as i64],
                )
                .map_err(db_err)?;

            if created > 0 {
                debug!("Created index namespace: {}", namespace);
            }
            Ok(())
        })
    }

    async fn insert(&self, namespace: &str, record: VectorRecord) -> Result<()> {
        let expected_id = VectorRecord::record_id(record.metadata.document_id, record.metadata.chunk_index);
        if record.id != expected_id {
            return Err(RagError::index(format!(
                "record id '{}' does not match its metadata ('{}')",
                record.id, expected_id
            )));
        }

        if let Some(embedding) = &record.embedding {
            if embedding.is_empty() || embedding.iter().any(|x| !x.is_finite()) {
                return Err(RagError::index(format!(
                    "record {} has an empty or non-finite embedding",
                    record.id
                )));
            }
        }

        if !self.namespace_exists(namespace)? {
            return Err(RagError::index(format!("namespace '{}' does not exist", namespace)));
        }

        let embedding_bytes = record.embedding.as_deref().map(vec_to_bytes);

        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO vector_records (namespace, id, document_id, chunk_index, filename,
                                            page_number, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (namespace, id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    filename = excluded.filename,
                    page_number = excluded.page_number,
                    content = excluded.content,
                    embedding = excluded.embedding
                "#,
                params![
                    namespace,
                    record.id,
                    record.metadata.document_id.to_string(),
                    record.metadata.chunk_index,
                    record.metadata.filename,
                    record.metadata.page_number,
                    record.content,
                    embedding_bytes,
                ],
            )
            .map_err(|e| RagError::index(format!("Failed to insert record: {}", e)))?;
            Ok(())
        })
    }

    async fn query(&self, namespace: &str, query: IndexQuery<'_>, k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 || !self.namespace_exists(namespace)? {
            return Ok(Vec::new());
        }

        let hits = match query {
            IndexQuery::Vector(vector) => self.vector_search(namespace, vector, k)?,
            IndexQuery::Text(text) => self.text_search(namespace, text, k)?,
        };

        debug!("Index query in {} returned {} hits", namespace, hits.len());
        Ok(hits)
    }

    async fn delete_document(&self, namespace: &str, document_id: Ulid) -> Result<u64> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM vector_records WHERE namespace = ?1 AND document_id = ?2",
                    params![namespace, document_id.to_string()],
                )
                .map_err(db_err)?;

            debug!("Deleted {} records of {} from {}", deleted, document_id, namespace);
            Ok(deleted as u64)
        })
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            tx.execute(
                "DELETE FROM vector_records WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(db_err)?;
            tx.execute("DELETE FROM namespaces WHERE name = ?1", params![namespace])
                .map_err(db_err)?;
            tx.commit().map_err(db_err)?;

            debug!("Dropped index namespace: {}", namespace);
            Ok(())
        })
    }

    async fn count(&self, namespace: &str) -> Result<IndexCount> {
        self.db.with_conn(|conn| {
            let (records, with_vectors): (i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COUNT(embedding) FROM vector_records WHERE namespace = ?1",
                    params![namespace],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(db_err)?;

            Ok(IndexCount {
                records: records as u64,
                with_vectors: with_vectors as u64,
            })
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    let embedding: Option<Vec<u8>> = row.get(6)?;

    Ok(StoredRecord {
        id: row.get(0)?,
        metadata: ChunkMetadata {
            document_id: get_ulid(row, 1)?,
            chunk_index: row.get(2)?,
            filename: row.get(3)?,
            page_number: row.get(4)?,
        },
        content: row.get(5)?,
        embedding: embedding.map(|bytes| bytes_to_vec(&bytes)),
    })
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Build an FTS5 query matching any of the words in `text`.
fn fts5_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
