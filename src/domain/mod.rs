//! Core domain types: Document and Chunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A JSON object used for document/chunk metadata.
///
/// Reserved keys used by the core itself: `order` (integer, chunk metadata,
/// 0-based position within the owning document), `md5` (hex string, document
/// metadata, content digest used for upsert no-op detection), `contentType`
/// (string, document metadata).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A document that has been ingested into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<i64>,
    pub content: String,
    /// Canonical source URI (absolutized file path, or URL). Unique when present.
    pub uri: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Build a new, not-yet-persisted document.
    pub fn new(content: impl Into<String>, uri: Option<String>, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            content: content.into(),
            uri,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn md5(&self) -> Option<&str> {
        self.metadata.get("md5").and_then(|v| v.as_str())
    }
}

/// A contiguous token window of a document's content; the unit of indexing
/// and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Option<i64>,
    pub document_id: i64,
    pub content: String,
    /// Carries at minimum the `order` key: this chunk's 0-based position
    /// within its document.
    pub metadata: Metadata,
    /// Populated by search primitives that hydrate the owning document;
    /// absent on plain CRUD reads.
    #[serde(default)]
    pub document_uri: Option<String>,
    #[serde(default)]
    pub document_metadata: Option<Metadata>,
}

impl Chunk {
    pub fn new(document_id: i64, content: impl Into<String>, order: usize) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("order".to_string(), serde_json::Value::from(order));
        Self {
            id: None,
            document_id,
            content: content.into(),
            metadata,
            document_uri: None,
            document_metadata: None,
        }
    }

    pub fn order(&self) -> Option<i64> {
        self.metadata.get("order").and_then(|v| v.as_i64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_order_roundtrips_through_metadata() {
        let chunk = Chunk::new(1, "hello", 3);
        assert_eq!(chunk.order(), Some(3));
    }

    #[test]
    fn document_exposes_md5_from_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("md5".to_string(), serde_json::Value::from("abc123"));
        let doc = Document::new("content", None, metadata);
        assert_eq!(doc.md5(), Some("abc123"));
    }
}
