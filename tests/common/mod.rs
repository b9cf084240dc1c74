// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vector_collections::{
    DocumentRecord, HashEmbedding, MemoryStorage, Metadata, QueryResult, StoreConfig, VectorStore,
};

pub const DEMO: &str = "krish_demo";

pub fn config_at(dir: &Path) -> StoreConfig {
    StoreConfig::with_data_dir(dir)
}

/// A file-backed store in a fresh temporary directory.
pub async fn temp_store() -> (TempDir, VectorStore) {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::open(config_at(dir.path())).await.unwrap();
    (dir, store)
}

pub async fn reopen(dir: &TempDir) -> VectorStore {
    VectorStore::open(config_at(dir.path())).await.unwrap()
}

pub async fn memory_store(storage: &MemoryStorage) -> VectorStore {
    VectorStore::open_with_storage(StoreConfig::default(), Arc::new(storage.clone()))
        .await
        .unwrap()
        .with_embedder(Arc::new(HashEmbedding::new(32).unwrap()))
}

/// The three-document collection used throughout:
/// a = [1, 0], b = [0, 1], c = [0.9, 0.1].
pub async fn seed_abc(store: &VectorStore) {
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();
    for (id, text, embedding) in [
        ("a", "apples are red", vec![1.0, 0.0]),
        ("b", "bananas are yellow", vec![0.0, 1.0]),
        ("c", "cherries are dark red", vec![0.9, 0.1]),
    ] {
        store
            .add_document(DEMO, DocumentRecord::new(id, text, embedding))
            .await
            .unwrap();
    }
}

pub fn result_ids(results: &[QueryResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

pub fn record_ids(records: &[DocumentRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}
