//! CLI command definitions. Handlers live in `main.rs`, which wires these
//! commands to [`crate::Client`]; this module only declares the surface.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// haiku-rag - an embedded retrieval-augmented generation library
#[derive(Parser, Debug)]
#[command(name = "haiku-rag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SearchMode {
    Dense,
    Fts,
    Hybrid,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file to the default location
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest a file or URL into the store
    Ingest {
        /// A file path or URL
        source: String,
    },

    /// Recursively ingest every supported file under a directory
    IngestDir {
        /// Root directory to walk
        path: PathBuf,
    },

    /// Search the store
    Search {
        /// Search query
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Retrieval mode
        #[arg(short, long, value_enum, default_value = "hybrid")]
        mode: SearchMode,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a document by id
    Delete {
        /// Document id
        id: i64,
    },

    /// List ingested documents
    List {
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Watch the configured monitor directories, ingesting changes as they happen
    Watch,

    /// Re-chunk and re-embed every document into a fresh store, e.g. after
    /// changing the embedding model or vector dimension
    Rebuild,

    /// Show database statistics
    Stats,

    /// Print the active configuration (secrets redacted)
    Settings,
}
