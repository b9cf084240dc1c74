// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::common::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vector_collections::{
    EmbeddingError, EmbeddingProvider, ErrorKind, HashEmbedding, MemoryStorage, Metadata,
    QueryRequest, StoreConfig, VectorStore,
};

/// Provider that fails, stalls or counts calls, for exercising error paths.
struct ScriptedEmbedding {
    mode: Mode,
    calls: AtomicUsize,
}

enum Mode {
    Fail,
    Stall,
    Constant(Vec<f32>),
}

impl ScriptedEmbedding {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            Mode::Fail => Err(EmbeddingError::Request("service unavailable".into())),
            Mode::Stall => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(vec![1.0])
            }
            Mode::Constant(vector) => Ok(vector.clone()),
        }
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

async fn store_with(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> (TempDir, VectorStore) {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::with_data_dir(dir.path());
    config.embedding_timeout = timeout;
    let store = VectorStore::open(config).await.unwrap().with_embedder(provider);
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();
    (dir, store)
}

#[tokio::test]
async fn test_add_text_and_query_by_text() {
    let (_dir, store) = store_with(
        Arc::new(HashEmbedding::new(128).unwrap()),
        Duration::from_secs(5),
    )
    .await;

    for (id, text) in [
        ("life", "What is the meaning of life?"),
        ("rust", "Rust is a systems programming language"),
        ("bread", "Banana bread needs ripe bananas"),
    ] {
        store.add_text(DEMO, id, text, Metadata::new()).await.unwrap();
    }
    assert_eq!(store.get_collection(DEMO).await.unwrap().dimension, Some(128));

    let hits = store
        .query(DEMO, QueryRequest::text("systems programming in Rust").k(1))
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["rust"]);
}

#[tokio::test]
async fn test_embedding_failure_commits_nothing() {
    let provider = ScriptedEmbedding::new(Mode::Fail);
    let (_dir, store) = store_with(provider.clone(), Duration::from_secs(5)).await;

    let err = store
        .add_text(DEMO, "doc1", "hello", Metadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingFailed);
    assert!(err.is_retryable());
    assert_eq!(store.count(DEMO).await.unwrap(), 0);
    assert_eq!(store.get_collection(DEMO).await.unwrap().dimension, None);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_embedding_timeout_commits_nothing() {
    let (_dir, store) = store_with(
        ScriptedEmbedding::new(Mode::Stall),
        Duration::from_millis(50),
    )
    .await;

    let err = store
        .add_text(DEMO, "doc1", "hello", Metadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingTimeout);
    assert_eq!(store.count(DEMO).await.unwrap(), 0);

    let err = store
        .query(DEMO, QueryRequest::text("hello"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingTimeout);
}

#[tokio::test]
async fn test_add_text_to_missing_collection_skips_embedding() {
    let provider = ScriptedEmbedding::new(Mode::Constant(vec![1.0, 0.0]));
    let (_dir, store) = store_with(provider.clone(), Duration::from_secs(5)).await;

    let err = store
        .add_text("no_such_collection", "doc1", "hello", Metadata::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provider_dimension_must_match_collection() {
    let storage = MemoryStorage::new();
    let store = memory_store(&storage).await;
    seed_abc(&store).await;

    // The demo collection holds 2-d vectors; the hash provider emits 32-d.
    let err = store
        .add_text(DEMO, "d", "dates", Metadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

    let err = store
        .query(DEMO, QueryRequest::text("dates"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}
