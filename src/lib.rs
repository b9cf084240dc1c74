// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Persistent document collections with embedding vectors and
//! nearest-neighbour queries.
//!
//! ```no_run
//! use vector_collections::{DocumentRecord, Metadata, QueryRequest, StoreConfig, VectorStore};
//!
//! # async fn demo() -> Result<(), vector_collections::StoreError> {
//! let store = VectorStore::open(StoreConfig::with_data_dir("vector_store_db")).await?;
//! store.create_or_get_collection("krish_demo", Metadata::new()).await?;
//! store
//!     .add_document("krish_demo", DocumentRecord::new("a", "first", vec![1.0, 0.0]))
//!     .await?;
//! let hits = store
//!     .query("krish_demo", QueryRequest::vector(vec![1.0, 0.0]).k(3))
//!     .await?;
//! assert_eq!(hits[0].id, "a");
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod core;
pub mod embedding;
pub mod index;
pub mod query;
pub mod storage;
pub mod store;

pub use crate::core::{
    CollectionInfo, CollectionOptions, CollectionSummary, DistanceMetric, DocumentRecord,
    ErrorKind, FilterError, Metadata, MetadataFilter, MetadataValue, QueryResult, StoreConfig,
    StoreError, StoreResult,
};
pub use crate::embedding::{EmbeddingError, EmbeddingProvider, GeminiEmbedding, HashEmbedding};
pub use crate::index::{FlatIndex, Neighbor, VectorIndex};
pub use crate::query::{QueryInput, QueryRequest};
pub use crate::storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use crate::store::VectorStore;
