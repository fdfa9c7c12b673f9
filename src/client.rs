//! The `Client` ingestion façade: the single entry point most callers use,
//! wrapping document/chunk repositories, the configured embedder and reader,
//! and URL fetching behind content-addressed upsert semantics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{Document, Metadata};
use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::reader::{self, DefaultReader, Reader};
use crate::store::repositories::chunk::DEFAULT_RRF_K;
use crate::store::repositories::{ChunkRepository, DocumentRepository};
use crate::store::Store;

/// Outcome of an upsert-by-content-hash operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document existed at this URI; one was created.
    Created,
    /// A document existed but its content changed; it was updated in place.
    Updated,
    /// A document existed with identical content (same MD5); nothing changed.
    Unchanged,
}

pub struct Client {
    store: Arc<Store>,
    documents: DocumentRepository,
    chunks: Arc<ChunkRepository>,
    reader: Arc<dyn Reader>,
    http: reqwest::Client,
}

impl Client {
    /// Open a client backed by `config`, using `embedder` to embed chunks.
    pub fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = Arc::new(Store::open(&config.database_path, config.embedding_vector_dim)?);
        Self::from_store_with_rrf_k(
            store,
            embedder,
            config.chunk_size,
            config.chunk_overlap,
            config.rrf_k,
        )
    }

    /// Build a client over an already-open store, e.g. an in-memory one used
    /// during [`Client::rebuild_database`], using the default RRF `k`.
    pub fn from_store(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self> {
        Self::from_store_with_rrf_k(store, embedder, chunk_size, chunk_overlap, DEFAULT_RRF_K)
    }

    /// As [`Client::from_store`], but with an explicit RRF `k`.
    pub fn from_store_with_rrf_k(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
        rrf_k: f64,
    ) -> Result<Self> {
        let chunks = Arc::new(ChunkRepository::new(
            store.clone(),
            embedder,
            chunk_size,
            chunk_overlap,
            rrf_k,
        ));
        let documents = DocumentRepository::new(store.clone(), chunks.clone());
        Ok(Self {
            store,
            documents,
            chunks,
            reader: Arc::new(DefaultReader),
            http: reqwest::Client::new(),
        })
    }

    pub fn chunks(&self) -> &ChunkRepository {
        &self.chunks
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Create a new document directly from in-memory content, bypassing
    /// upsert semantics entirely. Used for programmatic ingestion where the
    /// caller manages identity themselves.
    pub async fn create_document(
        &self,
        content: impl Into<String>,
        uri: Option<String>,
        metadata: Metadata,
    ) -> Result<Document> {
        self.documents
            .create(Document::new(content, uri, metadata))
            .await
    }

    pub async fn get_document_by_id(&self, id: i64) -> Result<Option<Document>> {
        self.documents.get_by_id(id).await
    }

    pub async fn get_document_by_uri(&self, uri: &str) -> Result<Option<Document>> {
        self.documents.get_by_uri(uri).await
    }

    pub async fn update_document(&self, document: Document) -> Result<Document> {
        self.documents.update(document).await
    }

    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        self.documents.delete(id).await
    }

    pub async fn list_documents(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<Document>> {
        self.documents.list_all(limit, offset).await
    }

    /// Ingest (or re-ingest) a local file, keyed by its canonicalized
    /// `file://` URI.
    ///
    /// Decision tree: extract content, compute its MD5, look up an existing
    /// document at this URI.
    /// - No existing document → create one, tagging metadata with the MD5.
    /// - Existing document, same MD5 → no-op, returns the existing document
    ///   unchanged.
    /// - Existing document, different MD5 → update content and MD5 in place.
    pub async fn create_or_update_from_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(Document, UpsertOutcome)> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        if !reader::is_supported_extension(&extension) {
            return Err(Error::InvalidArgument(format!(
                "unsupported file extension: {extension}"
            )));
        }
        if !path.exists() {
            return Err(Error::InvalidArgument(format!("file does not exist: {path:?}")));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::InvalidArgument(format!("failed to read {path:?}: {e}")))?;
        let content = self.reader.extract(path).await?;
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| Error::InvalidArgument(format!("failed to canonicalize {path:?}: {e}")))?;
        let uri = format!("file://{}", canonical.display());

        let mut metadata = Metadata::new();
        metadata.insert(
            "contentType".to_string(),
            serde_json::Value::from(reader::guess_mime(&extension)),
        );
        self.upsert_by_uri(uri, content, &bytes, metadata).await
    }

    /// Fetch `url`, materialize its content to a temp file (so extension
    /// detection and the `Reader` boundary stay file-based), and upsert it
    /// the same way as a local file — keyed by the URL itself, not the temp
    /// path.
    pub async fn create_or_update_from_url(&self, url: &str) -> Result<(Document, UpsertOutcome)> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::FetchError(format!("failed to fetch {url}: {e}")))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::FetchError(format!("failed to read response body from {url}: {e}")))?;

        let extension = extension_for(content_type.as_deref(), url);

        let temp = tempfile::Builder::new()
            .suffix(&extension)
            .tempfile()
            .map_err(Error::Io)?;
        tokio::fs::write(temp.path(), &bytes)
            .await
            .map_err(Error::Io)?;

        let content = self.reader.extract(temp.path()).await?;
        // tempfile's Drop removes the file; nothing further to clean up.

        let mut metadata = Metadata::new();
        metadata.insert(
            "contentType".to_string(),
            serde_json::Value::from(content_type.unwrap_or_else(|| reader::guess_mime(&extension).to_string())),
        );
        self.upsert_by_uri(url.to_string(), content, &bytes, metadata).await
    }

    async fn upsert_by_uri(
        &self,
        uri: String,
        content: String,
        raw_bytes: &[u8],
        mut metadata: Metadata,
    ) -> Result<(Document, UpsertOutcome)> {
        let digest = format!("{:x}", md5::compute(raw_bytes));
        metadata.insert("md5".to_string(), serde_json::Value::from(digest.clone()));

        match self.documents.get_by_uri(&uri).await? {
            None => {
                let document = self.create_document(content, Some(uri), metadata).await?;
                Ok((document, UpsertOutcome::Created))
            }
            Some(existing) if existing.md5() == Some(digest.as_str()) => {
                Ok((existing, UpsertOutcome::Unchanged))
            }
            Some(mut existing) => {
                existing.content = content;
                existing.metadata = metadata;
                let updated = self.documents.update(existing).await?;
                Ok((updated, UpsertOutcome::Updated))
            }
        }
    }

    /// Re-chunk and re-embed every document against a fresh store (e.g.
    /// after changing `embedding_vector_dim` or switching embedding models).
    /// Streams one item per document rebuilt so a caller can drive a
    /// progress indicator.
    pub fn rebuild_database(
        self: Arc<Self>,
        new_store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> ReceiverStream<Result<Document>> {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tokio::spawn(async move {
            let fresh = match Client::from_store(new_store, embedder, chunk_size, chunk_overlap) {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut offset = 0;
            loop {
                let batch = match self.documents.list_all(Some(100), Some(offset)).await {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                if batch.is_empty() {
                    break;
                }
                let batch_len = batch.len();
                for document in batch {
                    let rebuilt = fresh
                        .create_document(document.content.clone(), document.uri.clone(), document.metadata.clone())
                        .await;
                    if rebuilt.is_err() {
                        warn!(uri = ?document.uri, "failed to rebuild document");
                    }
                    if tx.send(rebuilt).await.is_err() {
                        return;
                    }
                }
                offset += batch_len as i64;
            }
            info!("rebuild complete");
        });
        ReceiverStream::new(rx)
    }
}

/// Map an HTTP response's content-type (or, failing that, the URL's own
/// path suffix) to a supported file extension, defaulting to `.html`.
fn extension_for(content_type: Option<&str>, url: &str) -> String {
    const CONTENT_TYPE_MAP: &[(&str, &str)] = &[
        ("text/html", ".html"),
        ("text/plain", ".txt"),
        ("text/markdown", ".md"),
        ("text/csv", ".csv"),
        ("application/pdf", ".pdf"),
        ("application/json", ".json"),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ".docx",
        ),
        (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ".pptx",
        ),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ".xlsx",
        ),
    ];

    if let Some(content_type) = content_type {
        if let Some((_, ext)) = CONTENT_TYPE_MAP.iter().find(|(ct, _)| *ct == content_type) {
            return (*ext).to_string();
        }
    }

    if let Some(suffix) = PathBuf::from(url.split('?').next().unwrap_or(url))
        .extension()
        .and_then(|e| e.to_str())
    {
        let with_dot = format!(".{}", suffix.to_lowercase());
        if reader::is_supported_extension(&with_dot) {
            return with_dot;
        }
    }

    ".html".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn client() -> Client {
        let store = Arc::new(Store::open_in_memory(4).unwrap());
        Client::from_store(store, Arc::new(StubEmbedder), 256, 32).unwrap()
    }

    #[test]
    fn extension_for_known_content_type() {
        assert_eq!(extension_for(Some("text/html"), "http://x/y"), ".html");
        assert_eq!(extension_for(Some("application/json"), "http://x/y"), ".json");
    }

    #[test]
    fn extension_for_falls_back_to_url_suffix_then_html() {
        assert_eq!(extension_for(None, "http://x/doc.md"), ".md");
        assert_eq!(extension_for(None, "http://x/unknown"), ".html");
    }

    #[tokio::test]
    async fn ingesting_new_file_creates_document() {
        let client = client();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "hello there").await.unwrap();

        let (doc, outcome) = client.create_or_update_from_file(&path).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(doc.content, "hello there");
    }

    /// A plain-text file's ingested metadata carries the guessed MIME type
    /// and the MD5 of its exact byte content.
    #[tokio::test]
    async fn ingesting_file_records_mime_type_and_digest() {
        let client = client();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let (doc, _) = client.create_or_update_from_file(&path).await.unwrap();
        assert_eq!(doc.metadata.get("contentType").unwrap(), "text/plain");
        assert_eq!(
            doc.metadata.get("md5").unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn reingesting_unchanged_file_is_a_no_op() {
        let client = client();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "stable content").await.unwrap();

        let (first, _) = client.create_or_update_from_file(&path).await.unwrap();
        let (second, outcome) = client.create_or_update_from_file(&path).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn reingesting_changed_file_updates_document() {
        let client = client();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "version one").await.unwrap();
        let (first, _) = client.create_or_update_from_file(&path).await.unwrap();

        tokio::fs::write(&path, "version two, much longer now").await.unwrap();
        let (second, outcome) = client.create_or_update_from_file(&path).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "version two, much longer now");
    }

    #[tokio::test]
    async fn ingesting_unsupported_extension_is_rejected() {
        let client = client();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.exe");
        tokio::fs::write(&path, "binary").await.unwrap();

        assert!(client.create_or_update_from_file(&path).await.is_err());
    }
}
