// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod error;
pub mod metadata_filter;
pub mod types;
pub mod vector_ops;

pub use config::StoreConfig;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use metadata_filter::{Comparison, FilterError, MetadataFilter};
pub use types::{
    CollectionInfo, CollectionOptions, CollectionSummary, DistanceMetric, DocumentRecord,
    Metadata, MetadataValue, QueryResult, FORMAT_VERSION,
};
