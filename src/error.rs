//! Error taxonomy for haiku-rag.

use thiserror::Error;

/// Main error type for haiku-rag operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Lookup by ID or URI failed where a failure (not a nullable return) is
    /// the appropriate signal, e.g. updating a document that doesn't exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unsupported file extension, unsupported content type, missing file,
    /// a chunk update without an ID, or an embedder/schema dimension mismatch.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The Reader failed to extract text from a source.
    #[error("parse error: {0}")]
    ParseError(String),

    /// HTTP fetch returned a non-2xx status or failed at the transport level.
    #[error("fetch error: {0}")]
    FetchError(String),

    /// The embedder rejected the input or was unreachable.
    #[error("embed error: {0}")]
    EmbedError(String),

    /// Database constraint violation or I/O failure.
    #[error("storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    /// Operation aborted by the caller before it completed.
    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for haiku-rag operations.
pub type Result<T> = std::result::Result<T, Error>;
