//! Chunk persistence, embedding, and hybrid retrieval.
//!
//! Every chunk row has a corresponding `chunk_embeddings` row and
//! `chunks_fts` row; the three are always created, updated, and deleted
//! together inside one transaction.

use std::sync::Arc;

use regex::Regex;
use rusqlite::Transaction;
use tracing::debug;

use crate::domain::Chunk;
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::store::Store;

/// Reciprocal rank fusion constant. 60 is the conventional default used
/// throughout the IR literature.
pub const DEFAULT_RRF_K: f64 = 60.0;

pub struct ChunkRepository {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    chunk_overlap: usize,
    rrf_k: f64,
}

impl ChunkRepository {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
        rrf_k: f64,
    ) -> Self {
        Self {
            store,
            embedder,
            chunk_size,
            chunk_overlap,
            rrf_k,
        }
    }

    /// Insert a single chunk (and its embedding and FTS row) in its own
    /// transaction.
    pub async fn create(&self, chunk: Chunk) -> Result<Chunk> {
        let vector = self.embedder.embed(&chunk.content).await?;
        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;
        let created = Self::insert_row(&tx, chunk, &vector)?;
        tx.commit()?;
        Ok(created)
    }

    /// Chunk `content` per the configured size/overlap and insert every
    /// resulting chunk for `document_id`, all inside one transaction.
    ///
    /// Used by [`crate::store::repositories::document::DocumentRepository`]
    /// so that a document and all of its chunks commit atomically; embedding
    /// calls happen while the transaction is open.
    pub(crate) async fn create_chunks_for_document_tx(
        &self,
        tx: &Transaction<'_>,
        document_id: i64,
        content: &str,
    ) -> Result<Vec<Chunk>> {
        let pieces = crate::chunking::chunk(content, self.chunk_size, self.chunk_overlap);
        let mut created = Vec::with_capacity(pieces.len());
        for (order, piece) in pieces.into_iter().enumerate() {
            let chunk = Chunk::new(document_id, piece, order);
            let vector = self.embedder.embed(&chunk.content).await?;
            created.push(Self::insert_row(tx, chunk, &vector)?);
        }
        Ok(created)
    }

    fn insert_row(tx: &Transaction<'_>, mut chunk: Chunk, vector: &[f32]) -> Result<Chunk> {
        tx.execute(
            "INSERT INTO chunks (document_id, content, metadata) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                chunk.document_id,
                chunk.content,
                serde_json::to_string(&chunk.metadata)?
            ],
        )?;
        let chunk_id = tx.last_insert_rowid();
        chunk.id = Some(chunk_id);

        tx.execute(
            "INSERT INTO chunk_embeddings (chunk_id, embedding) VALUES (?1, ?2)",
            rusqlite::params![chunk_id, Store::serialize_vector(vector)],
        )?;
        tx.execute(
            "INSERT INTO chunks_fts (rowid, content) VALUES (?1, ?2)",
            rusqlite::params![chunk_id, chunk.content],
        )?;

        Ok(chunk)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Chunk>> {
        let conn = self.store.conn().await;
        fetch_chunk(&conn, id)
    }

    pub async fn get_by_document_id(&self, document_id: i64) -> Result<Vec<Chunk>> {
        let conn = self.store.conn().await;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, content, metadata FROM chunks
             WHERE document_id = ?1
             ORDER BY CAST(JSON_EXTRACT(metadata, '$.order') AS INTEGER)",
        )?;
        let rows = stmt
            .query_map([document_id], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn list_all(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<Chunk>> {
        let conn = self.store.conn().await;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, content, metadata FROM chunks
             ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![limit.unwrap_or(-1), offset.unwrap_or(0)],
                row_to_chunk,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Rewrite a chunk's content/metadata, recompute its embedding, and
    /// rewrite its FTS row. Always commits.
    pub async fn update(&self, chunk: Chunk) -> Result<Chunk> {
        let id = chunk
            .id
            .ok_or_else(|| crate::error::Error::InvalidArgument("chunk has no id".into()))?;
        let vector = self.embedder.embed(&chunk.content).await?;

        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE chunks SET content = ?1, metadata = ?2 WHERE id = ?3",
            rusqlite::params![chunk.content, serde_json::to_string(&chunk.metadata)?, id],
        )?;
        tx.execute(
            "UPDATE chunk_embeddings SET embedding = ?1 WHERE chunk_id = ?2",
            rusqlite::params![Store::serialize_vector(&vector), id],
        )?;
        tx.execute(
            "UPDATE chunks_fts SET content = ?1 WHERE rowid = ?2",
            rusqlite::params![chunk.content, id],
        )?;
        tx.commit()?;
        Ok(chunk)
    }

    /// Delete the FTS row, then the embedding row, then the chunk row.
    /// Returns whether a chunk was actually deleted.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;
        let deleted = Self::delete_by_id_tx(&tx, id)?;
        tx.commit()?;
        Ok(deleted)
    }

    fn delete_by_id_tx(tx: &Transaction<'_>, id: i64) -> Result<bool> {
        tx.execute("DELETE FROM chunks_fts WHERE rowid = ?1", [id])?;
        tx.execute("DELETE FROM chunk_embeddings WHERE chunk_id = ?1", [id])?;
        let changed = tx.execute("DELETE FROM chunks WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    pub(crate) fn delete_by_document_id_tx(tx: &Transaction<'_>, document_id: i64) -> Result<()> {
        let ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM chunks WHERE document_id = ?1")?;
            stmt.query_map([document_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for id in ids {
            Self::delete_by_id_tx(tx, id)?;
        }
        Ok(())
    }

    pub async fn delete_by_document_id(&self, document_id: i64) -> Result<()> {
        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;
        Self::delete_by_document_id_tx(&tx, document_id)?;
        tx.commit()?;
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<()> {
        let mut conn = self.store.conn().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks_fts", [])?;
        tx.execute("DELETE FROM chunk_embeddings", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Dense k-NN search over `chunk_embeddings`. Score is `1 / (1 + distance)`
    /// so closer matches score higher.
    pub async fn search_dense(&self, query: &str, limit: usize) -> Result<Vec<(Chunk, f64)>> {
        let vector = self.embedder.embed(query).await?;
        let bytes = Store::serialize_vector(&vector);

        let conn = self.store.conn().await;
        let mut stmt = conn.prepare(
            "SELECT chunk_id, distance FROM chunk_embeddings
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance",
        )?;
        let hits: Vec<(i64, f64)> = stmt
            .query_map(rusqlite::params![bytes, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(hits.len());
        for (chunk_id, distance) in hits {
            if let Some(chunk) = fetch_chunk_hydrated(&conn, chunk_id)? {
                results.push((chunk, 1.0 / (1.0 + distance)));
            }
        }
        Ok(results)
    }

    /// Lexical BM25 search over `chunks_fts`. Score is `-rank`, since FTS5's
    /// `rank` column is negative bm25 (lower is better).
    pub async fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<(Chunk, f64)>> {
        let word_re = Regex::new(r"\b\w+\b").expect("static regex is valid");
        let terms: Vec<&str> = word_re.find_iter(&query.to_lowercase()).map(|m| m.as_str()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let match_query = terms.join(" OR ");

        let conn = self.store.conn().await;
        let mut stmt = conn.prepare(
            "SELECT rowid, rank FROM chunks_fts WHERE chunks_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let hits: Vec<(i64, f64)> = stmt
            .query_map(rusqlite::params![match_query, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(hits.len());
        for (chunk_id, rank) in hits {
            if let Some(chunk) = fetch_chunk_hydrated(&conn, chunk_id)? {
                results.push((chunk, -rank));
            }
        }
        Ok(results)
    }

    /// Reciprocal rank fusion over dense and lexical results.
    ///
    /// `s = 1/(k + r_v) + 1/(k + r_f)`, 1-based ranks, missing from one list
    /// contributing 0 for that term. The dense candidate pool is `limit * 3`
    /// chunks wide so fusion has enough depth to reorder against lexical
    /// hits.
    pub async fn search_hybrid(&self, query: &str, limit: usize) -> Result<Vec<(Chunk, f64)>> {
        let dense = self.search_dense(query, limit * 3).await?;
        let lexical = self.search_fts(query, limit * 3).await?;

        let mut scores: std::collections::HashMap<i64, (Chunk, f64)> =
            std::collections::HashMap::new();

        for (rank, (chunk, _)) in dense.into_iter().enumerate() {
            let r = (rank + 1) as f64;
            let entry = scores
                .entry(chunk.id.expect("persisted chunk has an id"))
                .or_insert_with(|| (chunk.clone(), 0.0));
            entry.1 += 1.0 / (self.rrf_k + r);
        }
        for (rank, (chunk, _)) in lexical.into_iter().enumerate() {
            let r = (rank + 1) as f64;
            let entry = scores
                .entry(chunk.id.expect("persisted chunk has an id"))
                .or_insert_with(|| (chunk.clone(), 0.0));
            entry.1 += 1.0 / (self.rrf_k + r);
        }

        let mut fused: Vec<(Chunk, f64)> = scores.into_values().collect();
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("RRF scores are finite"));
        fused.truncate(limit);
        debug!(query, fused = fused.len(), "hybrid search complete");
        Ok(fused)
    }
}

fn fetch_chunk(conn: &rusqlite::Connection, id: i64) -> Result<Option<Chunk>> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row(
            "SELECT id, document_id, content, metadata FROM chunks WHERE id = ?1",
            [id],
            row_to_chunk,
        )
        .optional()?)
}

/// As [`fetch_chunk`], but joins `documents` to hydrate `document_uri` and
/// `document_metadata`, as the search primitives require.
fn fetch_chunk_hydrated(conn: &rusqlite::Connection, id: i64) -> Result<Option<Chunk>> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row(
            "SELECT c.id, c.document_id, c.content, c.metadata, d.uri, d.metadata
             FROM chunks c LEFT JOIN documents d ON d.id = c.document_id
             WHERE c.id = ?1",
            [id],
            row_to_hydrated_chunk,
        )
        .optional()?)
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let metadata_json: String = row.get(3)?;
    let metadata: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(Chunk {
        id: Some(row.get(0)?),
        document_id: row.get(1)?,
        content: row.get(2)?,
        metadata,
        document_uri: None,
        document_metadata: None,
    })
}

fn row_to_hydrated_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let metadata_json: String = row.get(3)?;
    let metadata: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&metadata_json).unwrap_or_default();
    let document_uri: Option<String> = row.get(4)?;
    let document_metadata_json: Option<String> = row.get(5)?;
    let document_metadata = document_metadata_json
        .and_then(|json| serde_json::from_str(&json).ok());
    Ok(Chunk {
        id: Some(row.get(0)?),
        document_id: row.get(1)?,
        content: row.get(2)?,
        metadata,
        document_uri,
        document_metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::Embedder;
    use async_trait::async_trait;

    /// Deterministic stub embedder: every vector is derived from the text's
    /// length and character sum so distinct texts get distinct vectors.
    struct StubEmbedder {
        dim: usize,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn vector_dim(&self) -> usize {
            self.dim
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let seed: f32 = text.bytes().map(|b| b as f32).sum::<f32>() / 255.0;
            Ok((0..self.dim)
                .map(|i| (seed + i as f32).sin())
                .collect())
        }
    }

    async fn repo_with_store() -> (Arc<Store>, ChunkRepository) {
        let store = Arc::new(Store::open_in_memory(8).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder { dim: 8 });
        let repo = ChunkRepository::new(store.clone(), embedder, 256, 32, DEFAULT_RRF_K);
        (store, repo)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (_store, repo) = repo_with_store().await;
        let chunk = Chunk::new(1, "the quick brown fox".to_string(), 0);
        let created = repo.create(chunk).await.unwrap();
        let fetched = repo.get_by_id(created.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(fetched.content, "the quick brown fox");
        assert_eq!(fetched.order(), Some(0));
    }

    #[tokio::test]
    async fn delete_removes_chunk_and_is_idempotent() {
        let (_store, repo) = repo_with_store().await;
        let chunk = Chunk::new(1, "ephemeral".to_string(), 0);
        let created = repo.create(chunk).await.unwrap();
        assert!(repo.delete(created.id.unwrap()).await.unwrap());
        assert!(!repo.delete(created.id.unwrap()).await.unwrap());
        assert!(repo.get_by_id(created.id.unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_by_document_id_orders_by_chunk_order() {
        let (_store, repo) = repo_with_store().await;
        repo.create(Chunk::new(1, "second".to_string(), 1)).await.unwrap();
        repo.create(Chunk::new(1, "first".to_string(), 0)).await.unwrap();

        let chunks = repo.get_by_document_id(1).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "first");
        assert_eq!(chunks[1].content, "second");
    }

    #[tokio::test]
    async fn search_fts_finds_lexical_match() {
        let (_store, repo) = repo_with_store().await;
        repo.create(Chunk::new(1, "the quick brown fox".to_string(), 0)).await.unwrap();
        repo.create(Chunk::new(1, "a slow green turtle".to_string(), 1)).await.unwrap();

        let results = repo.search_fts("fox", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].0.content.contains("fox"));
    }

    #[tokio::test]
    async fn search_hydrates_owning_document_uri_and_metadata() {
        let store = Arc::new(Store::open_in_memory(8).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder { dim: 8 });
        let chunks = Arc::new(ChunkRepository::new(
            store.clone(),
            embedder,
            256,
            32,
            DEFAULT_RRF_K,
        ));
        let documents = crate::store::repositories::DocumentRepository::new(store, chunks.clone());

        let document = crate::domain::Document::new(
            "a quick brown fox runs".to_string(),
            Some("file:///fox.txt".to_string()),
            crate::domain::Metadata::new(),
        );
        documents.create(document).await.unwrap();

        let results = chunks.search_fts("fox", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.document_uri.as_deref(), Some("file:///fox.txt"));
        assert!(results[0].0.document_metadata.is_some());
    }

    #[tokio::test]
    async fn search_hybrid_returns_fused_and_bounded_results() {
        let (_store, repo) = repo_with_store().await;
        for i in 0..5 {
            repo.create(Chunk::new(1, format!("document number {i} about retrieval"), i))
                .await
                .unwrap();
        }
        let results = repo.search_hybrid("retrieval", 3).await.unwrap();
        assert!(results.len() <= 3);
        assert!(!results.is_empty());
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }
}
