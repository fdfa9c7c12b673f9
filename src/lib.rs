//! An embedded, single-node retrieval-augmented generation library.
//!
//! Ingests documents (files or URLs) into a SQLite-backed store, chunking
//! them token-aligned and embedding each chunk, then serves hybrid
//! dense/lexical retrieval over the result. See [`Client`] for the main
//! entry point.

pub mod chunking;
pub mod cli;
pub mod client;
pub mod config;
pub mod domain;
pub mod embeddings;
pub mod error;
pub mod reader;
pub mod store;
pub mod tokenizer;
pub mod watcher;

pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use store::Store;
