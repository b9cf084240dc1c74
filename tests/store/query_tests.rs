// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::common::*;
use approx::assert_relative_eq;
use serde_json::json;
use vector_collections::{
    CollectionOptions, DistanceMetric, DocumentRecord, ErrorKind, Metadata, MetadataFilter,
    QueryRequest, StoreError,
};

#[tokio::test]
async fn test_nearest_two_then_after_delete() {
    let (_dir, store) = temp_store().await;
    seed_abc(&store).await;

    let hits = store
        .query(DEMO, QueryRequest::vector(vec![1.0, 0.0]).k(2))
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["a", "c"]);
    assert_relative_eq!(hits[0].distance, 0.0);
    assert_relative_eq!(hits[1].distance, 0.02, epsilon = 1e-6);
    assert_eq!(hits[1].text, "cherries are dark red");

    store.delete_document(DEMO, "a").await.unwrap();
    let hits = store
        .query(DEMO, QueryRequest::vector(vec![1.0, 0.0]).k(2))
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["c", "b"]);
    assert_eq!(hits[0].rank, 0);
    assert_eq!(hits[1].rank, 1);
}

#[tokio::test]
async fn test_k_bounds() {
    let (_dir, store) = temp_store().await;
    seed_abc(&store).await;

    let all = store
        .query(DEMO, QueryRequest::vector(vec![0.0, 1.0]).k(50))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));

    let none = store
        .query(DEMO, QueryRequest::vector(vec![0.0, 1.0]).k(0))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_empty_collection_returns_nothing() {
    let (_dir, store) = temp_store().await;
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();
    let hits = store
        .query(DEMO, QueryRequest::vector(vec![1.0, 2.0, 3.0]))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_query_dimension_mismatch() {
    let (_dir, store) = temp_store().await;
    seed_abc(&store).await;
    let err = store
        .query(DEMO, QueryRequest::vector(vec![1.0, 0.0, 0.0]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
}

#[tokio::test]
async fn test_equal_distances_break_ties_by_id() {
    let (_dir, store) = temp_store().await;
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();
    for id in ["delta", "alpha", "charlie", "bravo"] {
        store
            .add_document(DEMO, DocumentRecord::new(id, id, vec![1.0, 1.0]))
            .await
            .unwrap();
    }

    for _ in 0..3 {
        let hits = store
            .query(DEMO, QueryRequest::vector(vec![0.0, 0.0]).k(3))
            .await
            .unwrap();
        assert_eq!(result_ids(&hits), vec!["alpha", "bravo", "charlie"]);
    }
}

#[tokio::test]
async fn test_metadata_filter_exact_match() {
    let (_dir, store) = temp_store().await;
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();
    for (id, embedding, color) in [
        ("a", vec![1.0, 0.0], "red"),
        ("b", vec![0.0, 1.0], "yellow"),
        ("c", vec![0.9, 0.1], "red"),
        ("d", vec![0.95, 0.0], "green"),
    ] {
        store
            .add_document(
                DEMO,
                DocumentRecord::new(id, id, embedding).with_field("color", color),
            )
            .await
            .unwrap();
    }

    let hits = store
        .query(
            DEMO,
            QueryRequest::vector(vec![1.0, 0.0])
                .k(5)
                .filter(MetadataFilter::equals("color", "red")),
        )
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["a", "c"]);
    assert_eq!(hits[1].rank, 1);
}

#[tokio::test]
async fn test_where_clause_operators() {
    let (_dir, store) = temp_store().await;
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();
    for year in 2018..2025 {
        let id = format!("paper{}", year);
        store
            .add_document(
                DEMO,
                DocumentRecord::new(id, "paper", vec![(year - 2018) as f32])
                    .with_field("year", year as i64)
                    .with_field("field", if year % 2 == 0 { "ml" } else { "db" }),
            )
            .await
            .unwrap();
    }

    let request = QueryRequest::vector(vec![0.0])
        .k(10)
        .where_json(&json!({
            "$and": [
                {"year": {"$gte": 2020}},
                {"field": {"$in": ["ml"]}}
            ]
        }))
        .unwrap();
    let hits = store.query(DEMO, request).await.unwrap();
    assert_eq!(result_ids(&hits), vec!["paper2020", "paper2022", "paper2024"]);

    let bad = QueryRequest::vector(vec![0.0]).where_json(&json!({"year": {"$regex": "x"}}));
    assert!(bad.is_err());
}

#[tokio::test]
async fn test_filter_matches_beyond_overfetch_window() {
    let (_dir, store) = temp_store().await;
    store
        .create_or_get_collection(DEMO, Metadata::new())
        .await
        .unwrap();
    for i in 0..100 {
        let tag = if i >= 95 { "rare" } else { "common" };
        store
            .add_document(
                DEMO,
                DocumentRecord::new(format!("d{:03}", i), "t", vec![i as f32]).with_field("tag", tag),
            )
            .await
            .unwrap();
    }

    let hits = store
        .query(
            DEMO,
            QueryRequest::vector(vec![0.0])
                .k(3)
                .filter(MetadataFilter::equals("tag", "rare")),
        )
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["d095", "d096", "d097"]);
}

#[tokio::test]
async fn test_document_contains() {
    let (_dir, store) = temp_store().await;
    seed_abc(&store).await;
    let hits = store
        .query(
            DEMO,
            QueryRequest::vector(vec![1.0, 0.0]).document_contains("red"),
        )
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["a", "c"]);
}

#[tokio::test]
async fn test_cosine_metric_ranking() {
    let (_dir, store) = temp_store().await;
    store
        .create_or_get_collection_with(
            "cosine_docs",
            CollectionOptions::default().metric(DistanceMetric::Cosine),
        )
        .await
        .unwrap();
    for (id, embedding) in [
        ("long", vec![10.0, 0.0]),
        ("diag", vec![1.0, 1.0]),
        ("zero", vec![0.0, 0.0]),
    ] {
        store
            .add_document("cosine_docs", DocumentRecord::new(id, id, embedding))
            .await
            .unwrap();
    }

    let hits = store
        .query("cosine_docs", QueryRequest::vector(vec![1.0, 0.0]).k(3))
        .await
        .unwrap();
    assert_eq!(result_ids(&hits), vec!["long", "diag", "zero"]);
    assert_relative_eq!(hits[0].distance, 0.0, epsilon = 1e-6);
    assert_relative_eq!(hits[2].distance, 1.0);
}

#[tokio::test]
async fn test_text_query_without_provider_fails() {
    let (_dir, store) = temp_store().await;
    seed_abc(&store).await;
    let err = store
        .query(DEMO, QueryRequest::text("red fruit"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingFailed);
}
