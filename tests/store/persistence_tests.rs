// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::common::*;
use chrono::Utc;
use std::io::Write;
use tempfile::TempDir;
use vector_collections::{
    CollectionInfo, DistanceMetric, DocumentRecord, ErrorKind, MemoryStorage, Metadata, MetadataValue,
    QueryRequest, StoreConfig, StoreError, VectorStore,
};

fn log_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("collections").join(DEMO).join("documents.log")
}

#[tokio::test]
async fn test_restart_recovers_all_documents() {
    let dir = TempDir::new().unwrap();
    {
        let store = reopen(&dir).await;
        seed_abc(&store).await;
        store
            .add_document(
                DEMO,
                DocumentRecord::new("d", "dates are sweet", vec![0.5, 0.5]).with_field("n", 4),
            )
            .await
            .unwrap();
    }

    let store = reopen(&dir).await;
    assert_eq!(store.count(DEMO).await.unwrap(), 4);
    assert_eq!(store.get_collection(DEMO).await.unwrap().dimension, Some(2));
    assert_eq!(
        store.get_document(DEMO, "d").await.unwrap().metadata["n"],
        MetadataValue::Int(4)
    );

    let hits = store
        .query(DEMO, QueryRequest::vector(vec![1.0, 0.0]).k(2))
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["a", "c"]);
}

#[tokio::test]
async fn test_restart_preserves_order_upserts_and_deletes() {
    let dir = TempDir::new().unwrap();
    {
        let store = reopen(&dir).await;
        seed_abc(&store).await;
        store
            .add_document(DEMO, DocumentRecord::new("a", "apples v2", vec![1.0, 0.0]))
            .await
            .unwrap();
        store.delete_document(DEMO, "b").await.unwrap();
        store
            .add_document(DEMO, DocumentRecord::new("b", "bananas v2", vec![0.0, 1.0]))
            .await
            .unwrap();
    }

    let store = reopen(&dir).await;
    let documents = store.peek(DEMO, 10).await.unwrap();
    assert_eq!(record_ids(&documents), vec!["a", "c", "b"]);
    assert_eq!(documents[0].text, "apples v2");
    assert_eq!(documents[2].text, "bananas v2");
}

#[tokio::test]
async fn test_torn_log_tail_is_discarded() {
    let dir = TempDir::new().unwrap();
    {
        let store = reopen(&dir).await;
        seed_abc(&store).await;
    }

    // A crash halfway through writing a frame leaves a partial header.
    let path = log_path(&dir);
    let good_len = std::fs::metadata(&path).unwrap().len();
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x40, 0x00, 0x00, 0x00, 0xde, 0xad]).unwrap();
    drop(file);

    let store = reopen(&dir).await;
    assert_eq!(store.count(DEMO).await.unwrap(), 3);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);

    store
        .add_document(DEMO, DocumentRecord::new("d", "after recovery", vec![0.1, 0.1]))
        .await
        .unwrap();
    drop(store);

    let store = reopen(&dir).await;
    assert_eq!(store.count(DEMO).await.unwrap(), 4);
}

#[tokio::test]
async fn test_damaged_committed_frame_is_not_discarded() {
    let dir = TempDir::new().unwrap();
    {
        let store = reopen(&dir).await;
        seed_abc(&store).await;
    }

    // Flip a byte inside the first frame's payload; two good frames follow.
    let path = log_path(&dir);
    let mut data = std::fs::read(&path).unwrap();
    let len = data.len() as u64;
    data[40] ^= 0xff;
    std::fs::write(&path, &data).unwrap();

    let store = reopen(&dir).await;
    let err = store.count(DEMO).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
}

#[tokio::test]
async fn test_failed_first_add_leaves_dimension_unset() {
    let dir = TempDir::new().unwrap();
    let store = reopen(&dir).await;
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();

    // A directory where the log belongs makes only the append fail.
    let path = log_path(&dir);
    std::fs::create_dir_all(&path).unwrap();
    let err = store
        .add_document(DEMO, DocumentRecord::new("a", "x", vec![1.0, 0.0]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    std::fs::remove_dir(&path).unwrap();

    assert_eq!(store.count(DEMO).await.unwrap(), 0);
    assert_eq!(store.get_collection(DEMO).await.unwrap().dimension, None);

    store
        .add_document(DEMO, DocumentRecord::new("b", "y", vec![1.0, 0.0, 0.0]))
        .await
        .unwrap();
    drop(store);

    let store = reopen(&dir).await;
    assert_eq!(store.get_collection(DEMO).await.unwrap().dimension, Some(3));
    assert_eq!(store.count(DEMO).await.unwrap(), 1);
}

#[tokio::test]
async fn test_compaction_keeps_live_state() {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::with_data_dir(dir.path());
    config.compaction_min_dead = 4;
    config.compaction_ratio = 0.5;

    let single_frame_len;
    {
        let store = VectorStore::open(config.clone()).await.unwrap();
        store
            .create_or_get_collection(DEMO, Metadata::new())
            .await
            .unwrap();
        store
            .add_document(DEMO, DocumentRecord::new("a", "v0", vec![1.0]))
            .await
            .unwrap();
        single_frame_len = std::fs::metadata(log_path(&dir)).unwrap().len();

        // Four more puts of the same id leave four dead frames out of five.
        for i in 1..5 {
            store
                .add_document(DEMO, DocumentRecord::new("a", format!("v{}", i), vec![1.0]))
                .await
                .unwrap();
        }
        assert_eq!(
            std::fs::metadata(log_path(&dir)).unwrap().len(),
            single_frame_len
        );
    }

    let store = VectorStore::open(config).await.unwrap();
    assert_eq!(store.count(DEMO).await.unwrap(), 1);
    assert_eq!(store.get_document(DEMO, "a").await.unwrap().text, "v4");
}

#[tokio::test]
async fn test_drop_is_durable() {
    let dir = TempDir::new().unwrap();
    {
        let store = reopen(&dir).await;
        seed_abc(&store).await;
        store
            .create_or_get_collection("keep_me", Metadata::new())
            .await
            .unwrap();
        store.drop_collection(DEMO).await.unwrap();
    }

    assert!(!dir.path().join("collections").join(DEMO).exists());

    let store = reopen(&dir).await;
    let names: Vec<_> = store
        .list_collections()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["keep_me".to_string()]);
    assert!(store.get_collection(DEMO).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_leftover_trash_is_purged_on_open() {
    let dir = TempDir::new().unwrap();
    let leftover = dir.path().join(".trash").join("krish_demo-interrupted");
    std::fs::create_dir_all(&leftover).unwrap();
    std::fs::write(leftover.join("documents.log"), b"stale").unwrap();

    let store = reopen(&dir).await;
    assert!(!dir.path().join(".trash").exists());
    assert!(store.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_newer_format_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let collection_dir = dir.path().join("collections").join(DEMO);
    std::fs::create_dir_all(&collection_dir).unwrap();

    let info = CollectionInfo {
        version: 99,
        name: DEMO.to_string(),
        metric: DistanceMetric::Cosine,
        dimension: Some(2),
        metadata: Metadata::new(),
        created_at: Utc::now(),
    };
    std::fs::write(
        collection_dir.join("collection.cbor"),
        serde_cbor::to_vec(&info).unwrap(),
    )
    .unwrap();

    let store = reopen(&dir).await;
    let err = store.count(DEMO).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
}

#[tokio::test]
async fn test_failed_write_commits_nothing() {
    let storage = MemoryStorage::new();
    let store = memory_store(&storage).await;
    seed_abc(&store).await;

    storage.set_fail_writes(true);
    let err = store
        .add_document(DEMO, DocumentRecord::new("d", "never stored", vec![0.3, 0.3]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
    assert!(err.is_retryable());
    assert!(store.delete_document(DEMO, "a").await.is_err());

    let created = store
        .create_or_get_collection("never_created", Metadata::new())
        .await;
    assert!(created.is_err());
    storage.set_fail_writes(false);

    assert_eq!(store.count(DEMO).await.unwrap(), 3);
    assert!(store.get_document(DEMO, "d").await.unwrap_err().is_not_found());
    assert!(store.get_document(DEMO, "a").await.is_ok());
    assert_eq!(store.list_collections().await.unwrap().len(), 1);

    store
        .add_document(DEMO, DocumentRecord::new("d", "stored now", vec![0.3, 0.3]))
        .await
        .unwrap();
    assert_eq!(store.count(DEMO).await.unwrap(), 4);
}

#[tokio::test]
async fn test_memory_store_survives_reopen() {
    let storage = MemoryStorage::new();
    {
        let store = memory_store(&storage).await;
        seed_abc(&store).await;
    }
    let store = memory_store(&storage).await;
    assert_eq!(record_ids(&store.peek(DEMO, 10).await.unwrap()), vec!["a", "b", "c"]);
}
