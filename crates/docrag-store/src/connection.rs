//! Shared SQLite connection handling.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags};
use tracing::info;
use ulid::Ulid;

use docrag_core::{RagError, Result};

/// A single SQLite connection behind a blocking mutex.
pub(crate) struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database file and apply `schema`.
    pub fn open(path: &Path, schema: &str, busy_timeout_ms: u32) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::database(format!("Failed to open database: {}", e)))?;

        Self::configure_connection(&conn, busy_timeout_ms)?;
        Self::init(conn, schema, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory(schema: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::database(format!("Failed to open in-memory database: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;
        Self::init(conn, schema, Path::new(":memory:"))
    }

    fn init(conn: Connection, schema: &str, path: &Path) -> Result<Self> {
        conn.execute_batch(schema)
            .map_err(|e| RagError::database(format!("Failed to initialize schema: {}", e)))?;

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure_connection(conn: &Connection, busy_timeout_ms: u32) -> Result<()> {
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = {};
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
            busy_timeout_ms
        ))
        .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    pub fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RagError::database(e.to_string()))?;
        f(&mut conn)
    }
}

/// Map a rusqlite error into a database error.
pub(crate) fn db_err(e: rusqlite::Error) -> RagError {
    RagError::database(e.to_string())
}

/// Read a ULID stored as text.
pub(crate) fn get_ulid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Ulid> {
    let text: String = row.get(idx)?;
    Ulid::from_string(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
