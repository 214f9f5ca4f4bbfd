//! SQLite-based relational store.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tracing::debug;
use ulid::Ulid;

use docrag_core::{
    ChatThread, Collection, Document, DocumentChunk, FileType, Message, RagError, Result, Role,
    Stats, Store, UserId,
};

use crate::connection::{db_err, get_ulid, Database};
use crate::schema::SCHEMA;

const COLLECTION_COLUMNS: &str = "id, owner_id, name, description, created_at";

const DOCUMENT_COLUMNS: &str = "id, collection_id, filename, storage_key, file_type, size_bytes, \
     processed, chunk_count, namespace, uploaded_at";

const THREAD_COLUMNS: &str = "id, owner_id, title, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, thread_id, role, content, is_rag_response, sources, created_at";

/// SQLite store for collections, documents, chunks, threads and messages.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout_ms: u32) -> Result<Self> {
        Ok(Self {
            db: Database::open(path.as_ref(), SCHEMA, busy_timeout_ms)?,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_memory(SCHEMA)?,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    // Collection operations

    async fn create_collection(&self, collection: Collection) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collections (id, owner_id, name, description, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    collection.id.to_string(),
                    collection.owner_id,
                    collection.name,
                    collection.description,
                    collection.created_at as i64,
                ],
            )
            .map_err(|e| RagError::database(format!("Failed to create collection: {}", e)))?;

            debug!("Created collection: {} ({})", collection.name, collection.id);
            Ok(())
        })
    }

    async fn get_collection(&self, id: Ulid) -> Result<Option<Collection>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM collections WHERE id = ?1", COLLECTION_COLUMNS),
                params![id.to_string()],
                row_to_collection,
            )
            .optional()
            .map_err(db_err)
        })
    }

    async fn list_collections(&self, owner_id: UserId) -> Result<Vec<Collection>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM collections WHERE owner_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC",
                    COLLECTION_COLUMNS
                ))
                .map_err(db_err)?;

            let collections = stmt
                .query_map(params![owner_id], row_to_collection)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(collections)
        })
    }

    async fn list_collections_with_processed(&self, owner_id: UserId) -> Result<Vec<Collection>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    r#"
                    SELECT {} FROM collections c
                    WHERE c.owner_id = ?1
                    AND EXISTS (
                        SELECT 1 FROM documents d
                        WHERE d.collection_id = c.id AND d.processed = 1
                    )
                    ORDER BY c.created_at DESC, c.rowid DESC
                    "#,
                    COLLECTION_COLUMNS
                ))
                .map_err(db_err)?;

            let collections = stmt
                .query_map(params![owner_id], row_to_collection)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(collections)
        })
    }

    async fn delete_collection(&self, id: Ulid) -> Result<()> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM collections WHERE id = ?1", params![id.to_string()])
                .map_err(db_err)?;

            if deleted == 0 {
                return Err(RagError::CollectionNotFound { id: id.to_string() });
            }

            debug!("Deleted collection: {}", id);
            Ok(())
        })
    }

    // Document operations

    async fn insert_document(&self, doc: Document) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO documents (id, collection_id, filename, storage_key, file_type,
                                       size_bytes, processed, chunk_count, namespace, uploaded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    doc.id.to_string(),
                    doc.collection_id.to_string(),
                    doc.filename,
                    doc.storage_key,
                    doc.file_type.as_str(),
                    doc.size_bytes as i64,
                    doc.processed,
                    doc.chunk_count,
                    doc.namespace,
                    doc.uploaded_at as i64,
                ],
            )
            .map_err(|e| RagError::database(format!("Failed to insert document: {}", e)))?;

            debug!("Inserted document: {} ({})", doc.filename, doc.id);
            Ok(())
        })
    }

    async fn get_document(&self, id: Ulid) -> Result<Option<Document>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id.to_string()],
                row_to_document,
            )
            .optional()
            .map_err(db_err)
        })
    }

    async fn list_documents(&self, collection_id: Ulid) -> Result<Vec<Document>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents WHERE collection_id = ?1 \
                     ORDER BY uploaded_at DESC, rowid DESC",
                    DOCUMENT_COLUMNS
                ))
                .map_err(db_err)?;

            let docs = stmt
                .query_map(params![collection_id.to_string()], row_to_document)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(docs)
        })
    }

    async fn count_processed_documents(&self, collection_id: Ulid) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection_id = ?1 AND processed = 1",
                    params![collection_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(count as u64)
        })
    }

    async fn mark_document_processed(&self, id: Ulid, chunk_count: u32, namespace: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE documents SET processed = 1, chunk_count = ?2, namespace = ?3 WHERE id = ?1",
                    params![id.to_string(), chunk_count, namespace],
                )
                .map_err(db_err)?;

            if updated == 0 {
                return Err(RagError::DocumentNotFound { id: id.to_string() });
            }
            Ok(())
        })
    }

    async fn mark_document_unprocessed(&self, id: Ulid) -> Result<()> {
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE documents SET processed = 0, chunk_count = 0 WHERE id = ?1",
                    params![id.to_string()],
                )
                .map_err(db_err)?;

            if updated == 0 {
                return Err(RagError::DocumentNotFound { id: id.to_string() });
            }
            Ok(())
        })
    }

    async fn delete_document(&self, id: Ulid) -> Result<()> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])
                .map_err(db_err)?;

            if deleted == 0 {
                return Err(RagError::DocumentNotFound { id: id.to_string() });
            }

            debug!("Deleted document: {}", id);
            Ok(())
        })
    }

    // Chunk operations

    async fn insert_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO document_chunks (document_id, chunk_index, content, page_number) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    chunk.document_id.to_string(),
                    chunk.chunk_index,
                    chunk.content,
                    chunk.page_number,
                ],
            )
            .map_err(|e| RagError::database(format!("Failed to insert chunk: {}", e)))?;
            Ok(())
        })
    }

    async fn get_chunks_for_document(&self, document_id: Ulid) -> Result<Vec<DocumentChunk>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT document_id, chunk_index, content, page_number
                    FROM document_chunks
                    WHERE document_id = ?1
                    ORDER BY chunk_index
                    "#,
                )
                .map_err(db_err)?;

            let chunks = stmt
                .query_map(params![document_id.to_string()], |row| {
                    Ok(DocumentChunk {
                        document_id: get_ulid(row, 0)?,
                        chunk_index: row.get(1)?,
                        content: row.get(2)?,
                        page_number: row.get(3)?,
                    })
                })
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(chunks)
        })
    }

    async fn delete_chunks_for_document(&self, document_id: Ulid) -> Result<u64> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM document_chunks WHERE document_id = ?1",
                    params![document_id.to_string()],
                )
                .map_err(db_err)?;
            Ok(deleted as u64)
        })
    }

    // Thread operations

    async fn create_thread(&self, thread: ChatThread) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_threads (id, owner_id, title, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    thread.id.to_string(),
                    thread.owner_id,
                    thread.title,
                    thread.created_at as i64,
                    thread.updated_at as i64,
                ],
            )
            .map_err(|e| RagError::database(format!("Failed to create thread: {}", e)))?;

            debug!("Created thread: {}", thread.id);
            Ok(())
        })
    }

    async fn get_thread(&self, id: Ulid) -> Result<Option<ChatThread>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM chat_threads WHERE id = ?1", THREAD_COLUMNS),
                params![id.to_string()],
                row_to_thread,
            )
            .optional()
            .map_err(db_err)
        })
    }

    async fn list_threads(&self, owner_id: UserId, limit: u32) -> Result<Vec<ChatThread>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM chat_threads WHERE owner_id = ?1 \
                     ORDER BY updated_at DESC, rowid DESC LIMIT ?2",
                    THREAD_COLUMNS
                ))
                .map_err(db_err)?;

            let threads = stmt
                .query_map(params![owner_id, limit], row_to_thread)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(threads)
        })
    }

    async fn set_thread_title_if_unset(&self, id: Ulid, title: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE chat_threads SET title = ?2 WHERE id = ?1 AND title IS NULL",
                    params![id.to_string(), title],
                )
                .map_err(db_err)?;
            Ok(updated > 0)
        })
    }

    async fn delete_thread(&self, id: Ulid) -> Result<()> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM chat_threads WHERE id = ?1", params![id.to_string()])
                .map_err(db_err)?;

            if deleted == 0 {
                return Err(RagError::ThreadNotFound { id: id.to_string() });
            }

            debug!("Deleted thread: {}", id);
            Ok(())
        })
    }

    async fn delete_threads_for_owner(&self, owner_id: UserId) -> Result<u64> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM chat_threads WHERE owner_id = ?1", params![owner_id])
                .map_err(db_err)?;
            Ok(deleted as u64)
        })
    }

    // Message operations

    async fn insert_message(&self, message: &Message) -> Result<()> {
        let sources = serde_json::to_string(&message.sources)?;

        self.db.with_conn(|conn| {
            let tx = conn.transaction().map_err(db_err)?;

            tx.execute(
                &format!(
                    "INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    MESSAGE_COLUMNS
                ),
                params![
                    message.id.to_string(),
                    message.thread_id.to_string(),
                    message.role.as_str(),
                    message.content,
                    message.is_rag_response,
                    sources,
                    message.created_at as i64,
                ],
            )
            .map_err(|e| RagError::database(format!("Failed to insert message: {}", e)))?;

            tx.execute(
                "UPDATE chat_threads SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
                params![message.thread_id.to_string(), message.created_at as i64],
            )
            .map_err(db_err)?;

            tx.commit().map_err(db_err)?;
            Ok(())
        })
    }

    async fn list_messages(&self, thread_id: Ulid) -> Result<Vec<Message>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM messages WHERE thread_id = ?1 ORDER BY created_at, rowid",
                    MESSAGE_COLUMNS
                ))
                .map_err(db_err)?;

            let messages = stmt
                .query_map(params![thread_id.to_string()], row_to_message)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(messages)
        })
    }

    async fn recent_messages(&self, thread_id: Ulid, limit: u32) -> Result<Vec<Message>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM messages WHERE thread_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                    MESSAGE_COLUMNS
                ))
                .map_err(db_err)?;

            let messages = stmt
                .query_map(params![thread_id.to_string(), limit], row_to_message)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(messages)
        })
    }

    async fn count_user_messages(&self, thread_id: Ulid) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE thread_id = ?1 AND role = ?2",
                    params![thread_id.to_string(), Role::User.as_str()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(count as u64)
        })
    }

    // Stats

    async fn get_stats(&self, owner_id: Option<UserId>) -> Result<Stats> {
        self.db.with_conn(|conn| {
            // NULL owner matches every row
            let count = |sql: &str| -> Result<u64> {
                conn.query_row(sql, params![owner_id], |row| row.get::<_, i64>(0))
                    .map(|n| n as u64)
                    .map_err(db_err)
            };

            let collections =
                count("SELECT COUNT(*) FROM collections WHERE ?1 IS NULL OR owner_id = ?1")?;

            let documents = count(
                r#"
                SELECT COUNT(*) FROM documents d
                JOIN collections c ON c.id = d.collection_id
                WHERE ?1 IS NULL OR c.owner_id = ?1
                "#,
            )?;

            let processed_documents = count(
                r#"
                SELECT COUNT(*) FROM documents d
                JOIN collections c ON c.id = d.collection_id
                WHERE d.processed = 1 AND (?1 IS NULL OR c.owner_id = ?1)
                "#,
            )?;

            let chunks = count(
                r#"
                SELECT COUNT(*) FROM document_chunks k
                JOIN documents d ON d.id = k.document_id
                JOIN collections c ON c.id = d.collection_id
                WHERE ?1 IS NULL OR c.owner_id = ?1
                "#,
            )?;

            let storage_bytes = count(
                r#"
                SELECT COALESCE(SUM(d.size_bytes), 0) FROM documents d
                JOIN collections c ON c.id = d.collection_id
                WHERE ?1 IS NULL OR c.owner_id = ?1
                "#,
            )?;

            let threads =
                count("SELECT COUNT(*) FROM chat_threads WHERE ?1 IS NULL OR owner_id = ?1")?;

            let messages = count(
                r#"
                SELECT COUNT(*) FROM messages m
                JOIN chat_threads t ON t.id = m.thread_id
                WHERE ?1 IS NULL OR t.owner_id = ?1
                "#,
            )?;

            Ok(Stats {
                collections,
                documents,
                processed_documents,
                chunks,
                threads,
                messages,
                storage_bytes,
                owner: owner_id,
            })
        })
    }
}

fn row_to_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: get_ulid(row, 0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let file_type_str: String = row.get(4)?;
    let file_type = FileType::from_extension(&file_type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown file type '{}'", file_type_str).into(),
        )
    })?;

    Ok(Document {
        id: get_ulid(row, 0)?,
        collection_id: get_ulid(row, 1)?,
        filename: row.get(2)?,
        storage_key: row.get(3)?,
        file_type,
        size_bytes: row.get::<_, i64>(5)? as u64,
        processed: row.get(6)?,
        chunk_count: row.get(7)?,
        namespace: row.get(8)?,
        uploaded_at: row.get::<_, i64>(9)? as u64,
    })
}

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatThread> {
    Ok(ChatThread {
        id: get_ulid(row, 0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get::<_, i64>(3)? as u64,
        updated_at: row.get::<_, i64>(4)? as u64,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown role '{}'", role_str).into(),
        )
    })?;
    let sources_str: String = row.get(5)?;

    Ok(Message {
        id: get_ulid(row, 0)?,
        thread_id: get_ulid(row, 1)?,
        role,
        content: row.get(3)?,
        is_rag_response: row.get(4)?,
        sources: serde_json::from_str(&sources_str).unwrap_or_default(),
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::Source;

    async fn store_with_collection(owner: UserId) -> (SqliteStore, Collection) {
        let store = SqliteStore::open_memory().unwrap();
        let coll = Collection::new(owner, "Policies", Some("HR documents"));
        store.create_collection(coll.clone()).await.unwrap();
        (store, coll)
    }

    fn doc(collection: &Collection, name: &str) -> Document {
        let file_type = FileType::from_filename(name).unwrap();
        Document::new(collection.id, name, &format!("uploads/{}", name), file_type, 42)
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.list_collections(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("docrag.db");

        let store = SqliteStore::open(&path, 5000).unwrap();
        store
            .create_collection(Collection::new(1, "a", None))
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path, 5000).unwrap();
        assert_eq!(reopened.list_collections(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_collection_crud() {
        let (store, coll) = store_with_collection(7).await;

        let retrieved = store.get_collection(coll.id).await.unwrap().unwrap();
        assert_eq!(retrieved.name, "Policies");
        assert_eq!(retrieved.description, "HR documents");
        assert_eq!(retrieved.owner_id, 7);

        // Owner scoping
        assert_eq!(store.list_collections(7).await.unwrap().len(), 1);
        assert!(store.list_collections(8).await.unwrap().is_empty());

        store.delete_collection(coll.id).await.unwrap();
        assert!(store.get_collection(coll.id).await.unwrap().is_none());

        let err = store.delete_collection(coll.id).await.unwrap_err();
        assert!(matches!(err, RagError::CollectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_collections_newest_first() {
        let store = SqliteStore::open_memory().unwrap();

        let mut older = Collection::new(1, "older", None);
        older.created_at = 1_000;
        let mut newer = Collection::new(1, "newer", None);
        newer.created_at = 2_000;
        store.create_collection(older).await.unwrap();
        store.create_collection(newer).await.unwrap();

        let names: Vec<_> = store
            .list_collections(1)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let (store, coll) = store_with_collection(1).await;

        let d = doc(&coll, "handbook.pdf");
        let doc_id = d.id;
        store.insert_document(d).await.unwrap();

        let retrieved = store.get_document(doc_id).await.unwrap().unwrap();
        assert_eq!(retrieved.filename, "handbook.pdf");
        assert_eq!(retrieved.file_type, FileType::Pdf);
        assert!(!retrieved.processed);
        assert_eq!(store.count_processed_documents(coll.id).await.unwrap(), 0);
        assert!(store
            .list_collections_with_processed(1)
            .await
            .unwrap()
            .is_empty());

        store
            .mark_document_processed(doc_id, 3, &coll.namespace())
            .await
            .unwrap();

        let processed = store.get_document(doc_id).await.unwrap().unwrap();
        assert!(processed.processed);
        assert_eq!(processed.chunk_count, 3);
        assert_eq!(processed.namespace, coll.namespace());
        assert_eq!(store.count_processed_documents(coll.id).await.unwrap(), 1);
        assert_eq!(
            store.list_collections_with_processed(1).await.unwrap().len(),
            1
        );

        store.mark_document_unprocessed(doc_id).await.unwrap();
        let reset = store.get_document(doc_id).await.unwrap().unwrap();
        assert!(!reset.processed);
        assert_eq!(reset.chunk_count, 0);
        assert_eq!(store.count_processed_documents(coll.id).await.unwrap(), 0);
        assert!(store
            .mark_document_unprocessed(Ulid::new())
            .await
            .unwrap_err()
            .to_string()
            .contains("Document not found"));

        store.delete_document(doc_id).await.unwrap();
        assert!(store.get_document(doc_id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_document(doc_id).await.unwrap_err(),
            RagError::DocumentNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_chunks() {
        let (store, coll) = store_with_collection(1).await;
        let d = doc(&coll, "notes.txt");
        let doc_id = d.id;
        store.insert_document(d).await.unwrap();

        for (i, text) in ["first", "second", "third"].iter().enumerate() {
            store
                .insert_chunk(&DocumentChunk {
                    document_id: doc_id,
                    chunk_index: i as u32,
                    content: text.to_string(),
                    page_number: if i == 2 { Some(2) } else { None },
                })
                .await
                .unwrap();
        }

        let chunks = store.get_chunks_for_document(doc_id).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[2].content, "third");
        assert_eq!(chunks[2].page_number, Some(2));

        // Duplicate ordinal is rejected
        let dup = DocumentChunk {
            document_id: doc_id,
            chunk_index: 1,
            content: "again".to_string(),
            page_number: None,
        };
        assert!(store.insert_chunk(&dup).await.is_err());

        assert_eq!(store.delete_chunks_for_document(doc_id).await.unwrap(), 3);
        assert!(store.get_chunks_for_document(doc_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collection_delete_cascades() {
        let (store, coll) = store_with_collection(1).await;
        let d = doc(&coll, "a.txt");
        let doc_id = d.id;
        store.insert_document(d).await.unwrap();
        store
            .insert_chunk(&DocumentChunk {
                document_id: doc_id,
                chunk_index: 0,
                content: "x".to_string(),
                page_number: None,
            })
            .await
            .unwrap();

        store.delete_collection(coll.id).await.unwrap();
        assert!(store.get_document(doc_id).await.unwrap().is_none());
        assert!(store.get_chunks_for_document(doc_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threads_and_messages() {
        let store = SqliteStore::open_memory().unwrap();
        let thread = ChatThread::new(3);
        let thread_id = thread.id;
        store.create_thread(thread).await.unwrap();

        let first = Message::user(thread_id, "What is the refund policy?");
        let answer = Message::rag_answer(
            thread_id,
            "30 days.",
            vec![Source {
                filename: "policy.pdf".to_string(),
                chunk_index: 4,
            }],
        );
        store.insert_message(&first).await.unwrap();
        store.insert_message(&answer).await.unwrap();

        let messages = store.list_messages(thread_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[1].is_rag_response);
        assert_eq!(messages[1].sources[0].filename, "policy.pdf");

        let recent = store.recent_messages(thread_id, 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, answer.id);

        assert_eq!(store.count_user_messages(thread_id).await.unwrap(), 1);

        // Title is set once
        assert!(store.set_thread_title_if_unset(thread_id, "first").await.unwrap());
        assert!(!store.set_thread_title_if_unset(thread_id, "second").await.unwrap());
        let stored = store.get_thread(thread_id).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("first"));

        store.delete_thread(thread_id).await.unwrap();
        assert!(store.list_messages(thread_id).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_thread(thread_id).await.unwrap_err(),
            RagError::ThreadNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_thread_listing_order_and_limit() {
        let store = SqliteStore::open_memory().unwrap();

        let mut ids = Vec::new();
        for i in 0..5u64 {
            let mut thread = ChatThread::new(1);
            thread.created_at = 1_000 + i;
            thread.updated_at = 1_000 + i;
            ids.push(thread.id);
            store.create_thread(thread).await.unwrap();
        }
        store.create_thread(ChatThread::new(2)).await.unwrap();

        // A new message moves the oldest thread to the front
        let mut msg = Message::user(ids[0], "bump");
        msg.created_at = 5_000;
        store.insert_message(&msg).await.unwrap();

        let listed = store.list_threads(1, 3).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, ids[0]);
        assert_eq!(listed[1].id, ids[4]);

        assert_eq!(store.delete_threads_for_owner(1).await.unwrap(), 5);
        assert!(store.list_threads(1, 20).await.unwrap().is_empty());
        assert_eq!(store.list_threads(2, 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, coll) = store_with_collection(1).await;
        let d = doc(&coll, "a.txt");
        let doc_id = d.id;
        store.insert_document(d).await.unwrap();
        store
            .insert_chunk(&DocumentChunk {
                document_id: doc_id,
                chunk_index: 0,
                content: "x".to_string(),
                page_number: None,
            })
            .await
            .unwrap();
        store.mark_document_processed(doc_id, 1, "ns").await.unwrap();
        store
            .create_collection(Collection::new(2, "other", None))
            .await
            .unwrap();

        let all = store.get_stats(None).await.unwrap();
        assert_eq!(all.collections, 2);
        assert_eq!(all.documents, 1);

        let mine = store.get_stats(Some(1)).await.unwrap();
        assert_eq!(mine.collections, 1);
        assert_eq!(mine.documents, 1);
        assert_eq!(mine.processed_documents, 1);
        assert_eq!(mine.chunks, 1);
        assert_eq!(mine.storage_bytes, 42);
        assert_eq!(mine.owner, Some(1));

        let theirs = store.get_stats(Some(2)).await.unwrap();
        assert_eq!(theirs.documents, 0);
    }
}
