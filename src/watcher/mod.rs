//! Filesystem watcher: keeps the store in sync with a set of monitored
//! directories.
//!
//! Create/modify events upsert the changed file; remove events delete its
//! document, both routed through [`Client`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::client::Client;
use crate::error::Result;
use crate::reader::is_supported_extension;

/// Watches a set of directories and keeps the store's documents in sync with
/// the filesystem: created/modified files are upserted, deleted files are
/// removed.
pub struct FileWatcher {
    paths: Vec<PathBuf>,
    client: Arc<Client>,
}

impl FileWatcher {
    pub fn new(paths: Vec<PathBuf>, client: Arc<Client>) -> Self {
        Self { paths, client }
    }

    /// Walk every watched directory once, upserting any file with a
    /// supported extension.
    pub async fn refresh(&self) -> Result<()> {
        for root in &self.paths {
            for entry in WalkDir::new(root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if has_supported_extension(path) {
                    self.upsert(path).await;
                }
            }
        }
        Ok(())
    }

    /// Run `refresh()` once, then watch for filesystem events indefinitely.
    pub async fn observe(&self) -> Result<()> {
        self.refresh().await?;

        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(64);
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res| {
                let _ = tx.blocking_send(res);
            })
            .map_err(|e| crate::error::Error::Io(std::io::Error::other(e)))?;

        for root in &self.paths {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| crate::error::Error::Io(std::io::Error::other(e)))?;
        }

        info!(paths = ?self.paths, "watching for changes");
        while let Some(event) = rx.recv().await {
            match event {
                Ok(event) => self.handle_event(event).await,
                Err(e) => warn!(error = %e, "filesystem watch error"),
            }
        }
        Ok(())
    }

    async fn handle_event(&self, event: Event) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    if has_supported_extension(&path) && path.exists() {
                        self.upsert(&path).await;
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    if has_supported_extension(&path) {
                        self.delete(&path).await;
                    }
                }
            }
            _ => {}
        }
    }

    async fn upsert(&self, path: &Path) {
        match self.client.create_or_update_from_file(path).await {
            Ok((document, outcome)) => {
                info!(?path, ?outcome, document_id = ?document.id, "upserted from watch event")
            }
            Err(e) => error!(?path, error = %e, "failed to upsert watched file"),
        }
    }

    async fn delete(&self, path: &Path) {
        let canonical = tokio::fs::canonicalize(path).await.unwrap_or_else(|_| path.to_path_buf());
        let uri = format!("file://{}", canonical.display());
        match self.client.get_document_by_uri(&uri).await {
            Ok(Some(document)) => {
                if let Some(id) = document.id {
                    match self.client.delete_document(id).await {
                        Ok(true) => info!(?path, "deleted document for removed file"),
                        Ok(false) => {}
                        Err(e) => error!(?path, error = %e, "failed to delete document"),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => error!(?path, error = %e, "failed to look up document for deleted file"),
        }
    }

    /// Debounce window used by callers that batch filesystem events before
    /// calling [`FileWatcher::refresh`] again; not used internally, since
    /// `notify` events are handled one at a time.
    pub const DEBOUNCE: Duration = Duration::from_millis(200);
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| is_supported_extension(e))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::Embedder;
    use crate::store::Store;
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

    #[tokio::test]
    async fn refresh_ingests_supported_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "first document").await.unwrap();
        tokio::fs::write(dir.path().join("b.md"), "second document").await.unwrap();
        tokio::fs::write(dir.path().join("c.bin"), "ignored").await.unwrap();

        let store = Arc::new(Store::open_in_memory(4).unwrap());
        let client = Arc::new(Client::from_store(store, Arc::new(StubEmbedder), 256, 32).unwrap());
        let watcher = FileWatcher::new(vec![dir.path().to_path_buf()], client.clone());
        watcher.refresh().await.unwrap();

        let docs = client.list_documents(None, None).await.unwrap();
        assert_eq!(docs.len(), 2);
    }
}
