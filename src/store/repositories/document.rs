//! Document persistence with transactional chunk fan-out.
//!
//! Every mutation that touches a document's chunks opens one transaction
//! covering the document row and all of its chunks, and rolls back whole on
//! any failure.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Transaction;

use crate::domain::Document;
use crate::error::{Error, Result};
use crate::store::repositories::chunk::ChunkRepository;
use crate::store::Store;

pub struct DocumentRepository {
    store: Arc<Store>,
    chunks: Arc<ChunkRepository>,
}

impl DocumentRepository {
    pub fn new(store: Arc<Store>, chunks: Arc<ChunkRepository>) -> Self {
        Self { store, chunks }
    }

    /// Insert `document` and chunk+embed its content, all in one transaction.
    pub async fn create(&self, mut document: Document) -> Result<Document> {
        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;

        let inserted = match Self::insert_document_row(&tx, &document) {
            Ok(id) => id,
            Err(e) => {
                tx.rollback()?;
                return Err(e);
            }
        };
        document.id = Some(inserted);

        if let Err(e) = self
            .chunks
            .create_chunks_for_document_tx(&tx, inserted, &document.content)
            .await
        {
            tx.rollback()?;
            return Err(e);
        }

        tx.commit()?;
        Ok(document)
    }

    fn insert_document_row(tx: &Transaction<'_>, document: &Document) -> Result<i64> {
        tx.execute(
            "INSERT INTO documents (content, uri, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                document.content,
                document.uri,
                serde_json::to_string(&document.metadata)?,
                document.created_at.to_rfc3339(),
                document.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(tx.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Document>> {
        use rusqlite::OptionalExtension;
        let conn = self.store.conn().await;
        Ok(conn
            .query_row(
                "SELECT id, content, uri, metadata, created_at, updated_at
                 FROM documents WHERE id = ?1",
                [id],
                row_to_document,
            )
            .optional()?)
    }

    pub async fn get_by_uri(&self, uri: &str) -> Result<Option<Document>> {
        use rusqlite::OptionalExtension;
        let conn = self.store.conn().await;
        Ok(conn
            .query_row(
                "SELECT id, content, uri, metadata, created_at, updated_at
                 FROM documents WHERE uri = ?1",
                [uri],
                row_to_document,
            )
            .optional()?)
    }

    /// Rewrite the document row, drop its existing chunks, and recreate them
    /// from the new content. One transaction; rolls back whole on failure.
    pub async fn update(&self, mut document: Document) -> Result<Document> {
        let id = document
            .id
            .ok_or_else(|| Error::InvalidArgument("document has no id".into()))?;
        document.updated_at = Utc::now();

        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;

        let result = (|| -> Result<()> {
            tx.execute(
                "UPDATE documents SET content = ?1, uri = ?2, metadata = ?3, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    document.content,
                    document.uri,
                    serde_json::to_string(&document.metadata)?,
                    document.updated_at.to_rfc3339(),
                    id,
                ],
            )?;
            Ok(())
        })();
        if let Err(e) = result {
            tx.rollback()?;
            return Err(e);
        }

        if let Err(e) = ChunkRepository::delete_by_document_id_tx(&tx, id) {
            tx.rollback()?;
            return Err(e);
        }

        if let Err(e) = self
            .chunks
            .create_chunks_for_document_tx(&tx, id, &document.content)
            .await
        {
            tx.rollback()?;
            return Err(e);
        }

        tx.commit()?;
        Ok(document)
    }

    /// Delete a document's chunks, then the document row itself. Idempotent:
    /// returns whether a document was actually deleted.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;
        ChunkRepository::delete_by_document_id_tx(&tx, id)?;
        let changed = tx.execute("DELETE FROM documents WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    pub async fn list_all(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<Document>> {
        let conn = self.store.conn().await;
        let mut stmt = conn.prepare(
            "SELECT id, content, uri, metadata, created_at, updated_at
             FROM documents ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![limit.unwrap_or(-1), offset.unwrap_or(0)],
                row_to_document,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let metadata_json: String = row.get(3)?;
    let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Document {
        id: Some(row.get(0)?),
        content: row.get(1)?,
        uri: row.get(2)?,
        metadata,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Metadata;
    use crate::embeddings::Embedder;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn vector_dim(&self) -> usize {
            4
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let seed: f32 = text.bytes().map(|b| b as f32).sum::<f32>() / 255.0;
            Ok((0..4).map(|i| (seed + i as f32).sin()).collect())
        }
    }

    async fn repo() -> DocumentRepository {
        let store = Arc::new(Store::open_in_memory(4).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
        let chunks = Arc::new(ChunkRepository::new(
            store.clone(),
            embedder,
            256,
            32,
            crate::store::repositories::chunk::DEFAULT_RRF_K,
        ));
        DocumentRepository::new(store, chunks)
    }

    #[tokio::test]
    async fn create_persists_document_and_chunks() {
        let repo = repo().await;
        let doc = Document::new("hello world, this is a short document".to_string(), None, Metadata::new());
        let created = repo.create(doc).await.unwrap();
        assert!(created.id.is_some());

        let fetched = repo.get_by_id(created.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(fetched.content, created.content);
    }

    #[tokio::test]
    async fn get_by_uri_finds_document() {
        let repo = repo().await;
        let doc = Document::new("content".to_string(), Some("file:///a.txt".to_string()), Metadata::new());
        repo.create(doc).await.unwrap();

        let found = repo.get_by_uri("file:///a.txt").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn delete_removes_document_and_is_idempotent() {
        let repo = repo().await;
        let doc = Document::new("to be deleted".to_string(), None, Metadata::new());
        let created = repo.create(doc).await.unwrap();

        assert!(repo.delete(created.id.unwrap()).await.unwrap());
        assert!(!repo.delete(created.id.unwrap()).await.unwrap());
        assert!(repo.get_by_id(created.id.unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_replaces_content_and_chunks() {
        let repo = repo().await;
        let doc = Document::new("original content".to_string(), None, Metadata::new());
        let mut created = repo.create(doc).await.unwrap();

        created.content = "replaced content entirely".to_string();
        let updated = repo.update(created).await.unwrap();
        let fetched = repo.get_by_id(updated.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(fetched.content, "replaced content entirely");
    }

    #[tokio::test]
    async fn list_all_orders_newest_first() {
        let repo = repo().await;
        repo.create(Document::new("first".to_string(), None, Metadata::new()))
            .await
            .unwrap();
        repo.create(Document::new("second".to_string(), None, Metadata::new()))
            .await
            .unwrap();

        let docs = repo.list_all(None, None).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "second");
    }
}
