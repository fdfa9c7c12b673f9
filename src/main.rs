use std::sync::Arc;

use clap::Parser;
use tokio_stream::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use haiku_rag::cli::{Cli, Commands, OutputFormat, SearchMode};
use haiku_rag::config::get_default_config_path;
use haiku_rag::embeddings::{Embedder, OllamaEmbedder};
use haiku_rag::error::Error;
use haiku_rag::{Client, Config, Result, Store};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!("haiku-rag starting");

    let config = match Config::load(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = execute_command(cli.command, config).await {
        error!("command failed: {e}");
        std::process::exit(1);
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))?;

    Ok(())
}

async fn execute_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Init { force } => handle_init(force, config),
        Commands::Ingest { source } => handle_ingest(source, config).await,
        Commands::IngestDir { path } => handle_ingest_dir(path, config).await,
        Commands::Search {
            query,
            top_k,
            mode,
            format,
        } => handle_search(query, top_k, mode, format, config).await,
        Commands::Delete { id } => handle_delete(id, config).await,
        Commands::List { limit } => handle_list(limit, config).await,
        Commands::Watch => handle_watch(config).await,
        Commands::Rebuild => handle_rebuild(config).await,
        Commands::Stats => handle_stats(config).await,
        Commands::Settings => handle_settings(config),
    }
}

fn build_embedder(config: &Config) -> Arc<dyn Embedder> {
    Arc::new(OllamaEmbedder::new(
        config.ollama_base_url.clone(),
        config.embedding_model.clone(),
        config.embedding_vector_dim,
    ))
}

fn handle_init(force: bool, config: Config) -> Result<()> {
    let config_path = get_default_config_path()
        .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "configuration file already exists at {config_path:?}; use --force to overwrite"
        )));
    }

    config.save(&config_path)?;
    println!("Configuration initialized at: {config_path:?}");
    Ok(())
}

async fn handle_ingest(source: String, config: Config) -> Result<()> {
    let client = Client::open(&config, build_embedder(&config))?;

    let (document, outcome) = if source.starts_with("http://") || source.starts_with("https://") {
        client.create_or_update_from_url(&source).await?
    } else {
        client.create_or_update_from_file(&source).await?
    };

    println!("{outcome:?}: document {:?} ({} bytes)", document.id, document.content.len());
    Ok(())
}

async fn handle_ingest_dir(path: std::path::PathBuf, config: Config) -> Result<()> {
    let client = Client::open(&config, build_embedder(&config))?;
    let watcher = haiku_rag::watcher::FileWatcher::new(vec![path], Arc::new(client));
    watcher.refresh().await
}

async fn handle_search(
    query: String,
    top_k: usize,
    mode: SearchMode,
    format: OutputFormat,
    config: Config,
) -> Result<()> {
    let client = Client::open(&config, build_embedder(&config))?;

    let results = match mode {
        SearchMode::Dense => client.chunks().search_dense(&query, top_k).await?,
        SearchMode::Fts => client.chunks().search_fts(&query, top_k).await?,
        SearchMode::Hybrid => client.chunks().search_hybrid(&query, top_k).await?,
    };

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = results
                .iter()
                .map(|(chunk, score)| serde_json::json!({"chunk_id": chunk.id, "score": score, "content": chunk.content}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for (chunk, score) in &results {
                println!("[{score:.4}] chunk {:?}: {}", chunk.id, truncate(&chunk.content, 200));
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max_chars).collect::<String>())
    }
}

async fn handle_delete(id: i64, config: Config) -> Result<()> {
    let client = Client::open(&config, build_embedder(&config))?;
    if client.delete_document(id).await? {
        println!("Deleted document {id}");
    } else {
        println!("No document with id {id}");
    }
    Ok(())
}

async fn handle_list(limit: i64, config: Config) -> Result<()> {
    let client = Client::open(&config, build_embedder(&config))?;
    let documents = client.list_documents(Some(limit), None).await?;
    for doc in documents {
        println!(
            "{:>6}  {}  {}",
            doc.id.unwrap_or(-1),
            doc.uri.as_deref().unwrap_or("-"),
            truncate(&doc.content, 60)
        );
    }
    Ok(())
}

async fn handle_watch(config: Config) -> Result<()> {
    let directories = config.monitor_directories.clone();
    if directories.is_empty() {
        return Err(Error::InvalidArgument(
            "no monitor_directories configured".to_string(),
        ));
    }
    let client = Arc::new(Client::open(&config, build_embedder(&config))?);
    let watcher = haiku_rag::watcher::FileWatcher::new(directories, client);
    watcher.observe().await
}

async fn handle_rebuild(config: Config) -> Result<()> {
    let embedder = build_embedder(&config);
    let old_store = Arc::new(Store::open(&config.database_path, config.embedding_vector_dim)?);
    let old_client = Arc::new(Client::from_store(
        old_store,
        embedder.clone(),
        config.chunk_size,
        config.chunk_overlap,
    )?);

    let rebuilt_path = config.database_path.with_extension("rebuild.db");
    let new_store = Arc::new(Store::open(&rebuilt_path, config.embedding_vector_dim)?);

    let mut stream = old_client.rebuild_database(
        new_store,
        embedder,
        config.chunk_size,
        config.chunk_overlap,
    );

    let mut count = 0;
    while let Some(result) = stream.next().await {
        match result {
            Ok(document) => {
                count += 1;
                println!("[{count}] rebuilt document {:?}", document.id);
            }
            Err(e) => error!("failed to rebuild a document: {e}"),
        }
    }

    println!("Rebuilt {count} document(s) into {rebuilt_path:?}");
    println!("Replace {:?} with the rebuilt database to finish.", config.database_path);
    Ok(())
}

async fn handle_stats(config: Config) -> Result<()> {
    let client = Client::open(&config, build_embedder(&config))?;
    let stats = client.store().stats().await?;

    println!("Database: {:?}", config.database_path);
    println!("  Documents:  {}", stats.documents);
    println!("  Chunks:     {}", stats.chunks);
    println!("  Embeddings: {}", stats.embeddings);
    println!("  Vector dim: {}", stats.vector_dim);
    Ok(())
}

fn handle_settings(config: Config) -> Result<()> {
    let dump = config.redacted_dump()?;
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}
