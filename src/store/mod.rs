//! Schema management, connection, vector (de)serialization, and transaction
//! boundaries.
//!
//! Four logical tables: `documents`, `chunks`, `chunk_embeddings` (a
//! sqlite-vec `vec0` virtual table), and `chunks_fts` (an FTS5 external-content
//! table over `chunks`). The consistency invariant across the latter three is
//! enforced by [`repositories::chunk::ChunkRepository`], not by the schema
//! itself — sqlite-vec and FTS5 virtual tables don't support foreign keys.

pub mod repositories;

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::{Error, Result};

/// An open haiku-rag database: one connection, one configured vector
/// dimension, serialized access for the single-writer model described in the
/// concurrency contract.
pub struct Store {
    conn: Mutex<Connection>,
    vector_dim: usize,
}

impl Store {
    /// Open or create a database at `path`.
    pub fn open(path: impl AsRef<Path>, vector_dim: usize) -> Result<Self> {
        info!(path = ?path.as_ref(), vector_dim, "opening store");
        let conn = Connection::open(path)?;
        Self::from_connection(conn, vector_dim)
    }

    /// Open an in-memory database, useful for tests and one-shot rebuilds.
    pub fn open_in_memory(vector_dim: usize) -> Result<Self> {
        info!(vector_dim, "opening in-memory store");
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, vector_dim)
    }

    fn from_connection(conn: Connection, vector_dim: usize) -> Result<Self> {
        unsafe {
            register_sqlite_vec(&conn)?;
        }
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;

        let store = Self {
            conn: Mutex::new(conn),
            vector_dim,
        };
        store.init_schema_blocking(vector_dim)?;
        Ok(store)
    }

    fn init_schema_blocking(&self, vector_dim: usize) -> Result<()> {
        let conn = self
            .conn
            .try_lock()
            .expect("no concurrent access during construction");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                uri TEXT UNIQUE,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_uri ON documents(uri)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)",
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_embeddings USING vec0(
                    chunk_id INTEGER PRIMARY KEY,
                    embedding FLOAT[{vector_dim}]
                )"
            ),
            [],
        )?;

        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content,
                content='chunks',
                content_rowid='id'
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS haiku_rag_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;

        let persisted_dim: Option<String> = conn
            .query_row(
                "SELECT value FROM haiku_rag_meta WHERE key = 'vector_dim'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match persisted_dim {
            Some(persisted) => {
                let persisted: usize = persisted.parse().unwrap_or(0);
                if persisted != vector_dim {
                    return Err(Error::InvalidArgument(format!(
                        "store was created with vector_dim={persisted}, \
                         but this embedder is configured for vector_dim={vector_dim}; \
                         rebuild the store to change dimensions"
                    )));
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO haiku_rag_meta (key, value) VALUES ('vector_dim', ?1)",
                    [vector_dim.to_string()],
                )?;
            }
        }

        Ok(())
    }

    /// Acquire the single connection. All repository methods route through
    /// this to preserve the single-writer invariant.
    pub(crate) async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    pub fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    /// Serialize a vector of f32s to little-endian bytes for sqlite-vec storage.
    pub fn serialize_vector(v: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(v.len() * 4);
        for value in v {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Inverse of [`Store::serialize_vector`].
    pub fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().expect("chunks_exact(4) yields 4 bytes")))
            .collect()
    }

    /// Explicit close. Connections also close on `Drop`; this exists so
    /// callers can scope a store's lifetime explicitly.
    pub async fn close(self) {
        drop(self.conn.into_inner());
    }

    /// Row counts across the three content tables, plus the configured
    /// vector dimension.
    pub async fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn().await;
        let documents = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
        let chunks = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let embeddings = conn.query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |r| r.get(0))?;
        Ok(StoreStats {
            documents,
            chunks,
            embeddings,
            vector_dim: self.vector_dim,
        })
    }

    /// Reclaim space and refresh the query planner's statistics. Safe to run
    /// periodically; not required for correctness.
    pub async fn optimize(&self) -> Result<()> {
        let conn = self.conn().await;
        conn.execute("VACUUM", [])?;
        conn.execute("ANALYZE", [])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub chunks: i64,
    pub embeddings: i64,
    pub vector_dim: usize,
}

/// Register the sqlite-vec extension's `vec0` virtual table module so every
/// connection opened from this process can use it.
///
/// # Safety
/// Calls into `sqlite3_auto_extension`, which registers a C callback invoked
/// for every future connection opened in this process. Must only be called
/// once per process and only with a valid, freshly opened connection.
unsafe fn register_sqlite_vec(_conn: &Connection) -> Result<()> {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vector_roundtrips_through_serialization() {
        let original = vec![1.0_f32, -2.5, 0.0, 3.75];
        let bytes = Store::serialize_vector(&original);
        assert_eq!(bytes.len(), original.len() * 4);
        let restored = Store::deserialize_vector(&bytes);
        assert_eq!(original, restored);
    }

    #[tokio::test]
    async fn opening_in_memory_store_initializes_schema() {
        let store = Store::open_in_memory(8).unwrap();
        assert_eq!(store.vector_dim(), 8);
        let conn = store.conn().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn reopening_with_mismatched_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = Store::open(&path, 8).unwrap();
            store.close().await;
        }
        let err = Store::open(&path, 16).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
