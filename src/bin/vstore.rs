// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vector_collections::{
    CollectionOptions, DistanceMetric, DocumentRecord, EmbeddingProvider, GeminiEmbedding,
    HashEmbedding, Metadata, MetadataValue, QueryRequest, StoreConfig, VectorStore,
};

#[derive(Parser, Debug)]
#[command(name = "vstore")]
#[command(about = "Manage persistent vector collections")]
#[command(version)]
struct Cli {
    /// Store directory (defaults to VECTOR_STORE_DATA_DIR or ./vector_store_db)
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Provider used for text embeddings
    #[arg(long, value_enum, default_value_t = Embedder::Hash)]
    embedder: Embedder,

    /// Output length of the hash embedder
    #[arg(long, default_value_t = 384)]
    hash_dim: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Embedder {
    /// Offline feature hashing
    Hash,
    /// Google Gemini, key from GOOGLE_API_KEY
    Gemini,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a collection, or show it if it exists
    Create {
        name: String,
        #[arg(long)]
        metric: Option<DistanceMetric>,
        /// Collection metadata as key=value
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },
    /// List collections
    List,
    /// Drop a collection and all its documents
    Drop { name: String },
    /// Add or replace a document
    Add {
        collection: String,
        id: String,
        text: String,
        /// Comma-separated embedding; embeds the text when omitted
        #[arg(long, value_name = "F32,...")]
        vector: Option<String>,
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },
    /// Show one document
    Get { collection: String, id: String },
    /// List documents in insertion order
    Docs {
        collection: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete a document
    Delete { collection: String, id: String },
    /// Nearest-neighbour query
    Query {
        collection: String,
        /// Query text, embedded with the selected provider
        #[arg(long, conflicts_with = "vector", required_unless_present = "vector")]
        text: Option<String>,
        #[arg(long, value_name = "F32,...")]
        vector: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        /// Metadata filter in `where` JSON syntax
        #[arg(long = "where", value_name = "JSON")]
        where_clause: Option<String>,
        /// Only documents whose text contains this
        #[arg(long)]
        contains: Option<String>,
    },
    /// Number of documents in a collection
    Count { collection: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "vector_collections=debug"
    } else {
        "vector_collections=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = StoreConfig::from_env();
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    info!(data_dir = %config.data_dir.display(), "using store");

    let store = VectorStore::open(config)
        .await
        .context("failed to open vector store")?
        .with_embedder(embedder(cli.embedder, cli.hash_dim)?);

    run(&store, cli.command).await
}

fn embedder(kind: Embedder, hash_dim: usize) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match kind {
        Embedder::Hash => Arc::new(HashEmbedding::new(hash_dim)?),
        Embedder::Gemini => Arc::new(GeminiEmbedding::from_env()?),
    };
    Ok(provider)
}

async fn run(store: &VectorStore, command: Command) -> Result<()> {
    match command {
        Command::Create {
            name,
            metric,
            metadata,
        } => {
            let mut options = CollectionOptions::with_metadata(parse_metadata(&metadata)?);
            options.metric = metric;
            print_json(&store.create_or_get_collection_with(&name, options).await?)
        }
        Command::List => print_json(&store.list_collections().await?),
        Command::Drop { name } => {
            store.drop_collection(&name).await?;
            println!("dropped {}", name);
            Ok(())
        }
        Command::Add {
            collection,
            id,
            text,
            vector,
            metadata,
        } => {
            let metadata = parse_metadata(&metadata)?;
            let record = match vector {
                Some(vector) => {
                    let record = DocumentRecord::new(id, text, parse_vector(&vector)?)
                        .with_metadata(metadata);
                    store.add_document(&collection, record).await?
                }
                None => store.add_text(&collection, &id, &text, metadata).await?,
            };
            print_json(&record)
        }
        Command::Get { collection, id } => print_json(&store.get_document(&collection, &id).await?),
        Command::Docs { collection, limit } => {
            let documents: Vec<DocumentRecord> = match limit {
                Some(limit) => store.peek(&collection, limit).await?,
                None => store.list_documents(&collection).try_collect().await?,
            };
            print_json(&documents)
        }
        Command::Delete { collection, id } => {
            store.delete_document(&collection, &id).await?;
            println!("deleted {}", id);
            Ok(())
        }
        Command::Query {
            collection,
            text,
            vector,
            k,
            where_clause,
            contains,
        } => {
            let mut request = match (text, vector) {
                (Some(text), _) => QueryRequest::text(text),
                (None, Some(vector)) => QueryRequest::vector(parse_vector(&vector)?),
                (None, None) => return Err(anyhow!("either --text or --vector is required")),
            }
            .k(k);
            if let Some(clause) = where_clause {
                let json: serde_json::Value =
                    serde_json::from_str(&clause).context("--where is not valid JSON")?;
                request = request.where_json(&json)?;
            }
            if let Some(needle) = contains {
                request = request.document_contains(needle);
            }
            print_json(&store.query(&collection, request).await?)
        }
        Command::Count { collection } => {
            println!("{}", store.count(&collection).await?);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid vector component '{}'", part.trim()))
        })
        .collect()
}

/// `key=value` pairs; values that parse as JSON scalars keep their type.
fn parse_metadata(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("metadata '{}' is not key=value", pair))?;
        let value = serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|json| MetadataValue::from_json(&json))
            .unwrap_or_else(|| MetadataValue::Str(raw.to_string()));
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}
