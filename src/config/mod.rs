//! Configuration surface: chunking, embedding provider, storage location,
//! and watched directories.
//!
//! Field names are deliberately flat and canonical (`embedding_provider`,
//! `embedding_model`, `embedding_vector_dim`) rather than grouped under an
//! ambiguous `Factory`-style sub-config, so each embedding-related setting
//! has one unambiguous home.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Substrings that mark a field as a secret for [`Config::redacted_dump`].
const SECRET_MARKERS: &[&str] = &["key", "password", "token", "secret"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Chunk size in tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap in tokens between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Embedding backend identifier, e.g. `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    /// Model name passed to the embedding backend.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Dimension `D` every embedding vector must have. Fixed at store
    /// creation; changing it requires rebuilding the database (see
    /// [`crate::client::Client::rebuild_database`]).
    #[serde(default = "default_embedding_vector_dim")]
    pub embedding_vector_dim: usize,

    /// API key for hosted embedding providers, if any. Never serialized back
    /// out in plain text by [`Config::redacted_dump`].
    #[serde(default)]
    pub embedding_api_key: Option<String>,

    /// Base URL for an Ollama-compatible embedding server.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    /// Directories watched by [`crate::watcher::FileWatcher`] for changes.
    #[serde(default)]
    pub monitor_directories: Vec<PathBuf>,

    /// `k` constant for reciprocal rank fusion.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
}

fn default_database_path() -> PathBuf {
    get_default_data_dir()
        .map(|d| d.join("haiku-rag.db"))
        .unwrap_or_else(|| PathBuf::from("haiku-rag.db"))
}
fn default_chunk_size() -> usize {
    crate::chunking::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    crate::chunking::DEFAULT_CHUNK_OVERLAP
}
fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_embedding_vector_dim() -> usize {
    1024
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_rrf_k() -> f64 {
    crate::store::repositories::chunk::DEFAULT_RRF_K
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_vector_dim: default_embedding_vector_dim(),
            embedding_api_key: None,
            ollama_base_url: default_ollama_base_url(),
            monitor_directories: Vec::new(),
            rrf_k: default_rrf_k(),
        }
    }
}

impl Config {
    /// Load configuration from a specific TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&contents).map_err(|e| Error::Config(format!("failed to parse config file: {e}")))
    }

    /// Load with precedence: explicit path, then the default config
    /// location, then built-in defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(&path);
        }
        if let Some(default_path) = get_default_config_path()
            && default_path.exists()
        {
            return Self::from_file(&default_path);
        }
        Ok(Config::default())
    }

    /// Persist configuration as TOML, creating parent directories as needed.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("failed to create config directory: {e}")))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("failed to write config file: {e}")))
    }

    /// A JSON rendering of this config with any field whose name looks like
    /// a secret (contains `key`, `password`, `token`, or `secret`) replaced
    /// by `"***"`. Used by the `stats`/settings CLI surface so credentials
    /// never land in a terminal transcript or log.
    pub fn redacted_dump(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            for (key, val) in map.iter_mut() {
                let lower = key.to_lowercase();
                if SECRET_MARKERS.iter().any(|marker| lower.contains(marker)) && !val.is_null() {
                    *val = serde_json::Value::String("***".to_string());
                }
            }
        }
        Ok(value)
    }
}

/// Default configuration file path, `<config dir>/config.toml`.
pub fn get_default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default data directory, platform-appropriate per `directories::ProjectDirs`.
pub fn get_default_data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "haiku-rag", "haiku-rag")
}
