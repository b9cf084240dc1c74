// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::metadata_filter::FilterError;
use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Document '{id}' not found in collection '{collection}'")]
    DocumentNotFound { collection: String, id: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Invariant violation in collection '{collection}': {detail}")]
    InvariantViolation { collection: String, detail: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
}

/// Coarse error category for callers deciding between retry and
/// user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DimensionMismatch,
    EmbeddingFailed,
    EmbeddingTimeout,
    Persistence,
    InvariantViolation,
    InvalidArgument,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::CollectionNotFound(_) | StoreError::DocumentNotFound { .. } => {
                ErrorKind::NotFound
            }
            StoreError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            StoreError::EmbeddingFailed(_) => ErrorKind::EmbeddingFailed,
            StoreError::EmbeddingTimeout(_) => ErrorKind::EmbeddingTimeout,
            StoreError::Persistence(_) => ErrorKind::Persistence,
            StoreError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            StoreError::InvalidArgument(_) | StoreError::Filter(_) => ErrorKind::InvalidArgument,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::EmbeddingFailed | ErrorKind::EmbeddingTimeout | ErrorKind::Persistence
        )
    }

    /// Whether in-memory state may have diverged from the durable log and
    /// the collection must be replayed before serving another request.
    pub(crate) fn requires_reload(&self) -> bool {
        matches!(
            self,
            StoreError::Persistence(_) | StoreError::InvariantViolation { .. }
        )
    }

    pub(crate) fn invariant(collection: &str, err: IndexError) -> Self {
        StoreError::InvariantViolation {
            collection: collection.to_string(),
            detail: err.to_string(),
        }
    }
}

impl From<EmbeddingError> for StoreError {
    fn from(err: EmbeddingError) -> Self {
        StoreError::EmbeddingFailed(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
