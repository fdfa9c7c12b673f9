//! Embedder boundary: `embed(text) -> vector<f32>[D]`.
//!
//! The core depends only on the [`Embedder`] trait. [`OllamaEmbedder`] is a
//! reference adapter kept so the crate is runnable end-to-end; production
//! deployments may swap in an OpenAI/Voyage/etc. adapter without touching
//! the core.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Produces a fixed-dimension dense vector for a piece of text.
///
/// Implementations may fail transiently (network); callers should expect
/// [`Error::EmbedError`] on such failures.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The dimension `D` every vector this embedder returns must have.
    fn vector_dim(&self) -> usize;

    /// Embed `text`. The returned vector has exactly [`Embedder::vector_dim`] components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Ollama-backed embedder, talking to a local `/api/embeddings` endpoint.
#[derive(Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    vector_dim: usize,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, vector_dim: usize) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            vector_dim,
            client: Client::new(),
        }
    }

    async fn embed_with_retry(&self, request: &EmbedRequest) -> Result<Vec<f32>> {
        const MAX_RETRIES: u32 = 3;
        const INITIAL_BACKOFF_MS: u64 = 100;

        let url = format!("{}/api/embeddings", self.base_url);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match self.client.post(&url).json(request).send().await {
                Ok(response) if response.status().is_success() => {
                    let body: EmbedResponse = response
                        .json()
                        .await
                        .map_err(|e| Error::EmbedError(format!("malformed response: {e}")))?;
                    return Ok(body.embedding);
                }
                Ok(response) => {
                    let status = response.status();
                    if retries >= MAX_RETRIES || status.as_u16() == 404 {
                        let text = response.text().await.unwrap_or_default();
                        return Err(Error::EmbedError(format!(
                            "ollama returned {status}: {text}"
                        )));
                    }
                    warn!(%status, attempt = retries + 1, "embedding request failed, retrying");
                    retries += 1;
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
                Err(e) => {
                    if retries >= MAX_RETRIES {
                        return Err(Error::EmbedError(format!(
                            "failed to reach ollama after {MAX_RETRIES} retries: {e}"
                        )));
                    }
                    warn!(attempt = retries + 1, error = %e, "network error, retrying");
                    retries += 1;
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.model, "embedding text");
        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };
        let vector = self.embed_with_retry(&request).await?;
        if vector.len() != self.vector_dim {
            return Err(Error::InvalidArgument(format!(
                "embedder returned {} dimensions, expected {}",
                vector.len(),
                self.vector_dim
            )));
        }
        Ok(vector)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_embedder_reports_configured_dimension() {
        let embedder = OllamaEmbedder::new("http://localhost:11434", "mxbai-embed-large", 1024);
        assert_eq!(embedder.vector_dim(), 1024);
    }
}
