//! Database schema definitions.

/// Relational schema: collections, documents, chunks, threads and messages.
pub const SCHEMA: &str = r#"
-- Collections table
CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner_id);

-- Documents table
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    file_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    namespace TEXT NOT NULL DEFAULT '',
    uploaded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_id);

-- Document chunks table
CREATE TABLE IF NOT EXISTS document_chunks (
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    page_number INTEGER,
    PRIMARY KEY (document_id, chunk_index)
);

-- Chat threads table
CREATE TABLE IF NOT EXISTS chat_threads (
    id TEXT PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    title TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_threads_owner ON chat_threads(owner_id, updated_at);

-- Messages table
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL REFERENCES chat_threads(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    is_rag_response INTEGER NOT NULL DEFAULT 0,
    sources TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, created_at);
"#;

/// Vector index schema: namespaced records with optional embeddings.
pub const INDEX_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS namespaces (
    name TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS vector_records (
    namespace TEXT NOT NULL,
    id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    filename TEXT NOT NULL,
    page_number INTEGER,
    content TEXT NOT NULL,
    embedding BLOB,
    PRIMARY KEY (namespace, id)
);

CREATE INDEX IF NOT EXISTS idx_vector_records_document ON vector_records(namespace, document_id);

-- FTS5 virtual table for text search when no embedding is available
CREATE VIRTUAL TABLE IF NOT EXISTS vector_records_fts USING fts5(
    content,
    content=vector_records,
    content_rowid=rowid
);

-- Triggers to keep FTS5 in sync with vector_records
CREATE TRIGGER IF NOT EXISTS vector_records_ai AFTER INSERT ON vector_records BEGIN
    INSERT INTO vector_records_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS vector_records_ad AFTER DELETE ON vector_records BEGIN
    INSERT INTO vector_records_fts(vector_records_fts, rowid, content) VALUES ('delete', OLD.rowid, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS vector_records_au AFTER UPDATE ON vector_records BEGIN
    INSERT INTO vector_records_fts(vector_records_fts, rowid, content) VALUES ('delete', OLD.rowid, OLD.content);
    INSERT INTO vector_records_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
END;
"#;
