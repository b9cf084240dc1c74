// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod flat;

pub use self::flat::FlatIndex;

use crate::core::types::DistanceMetric;
use std::cmp::Ordering;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("Vector with ID {0:?} already exists")]
    DuplicateId(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A nearest-neighbor hit. Orders by distance, ties broken by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub distance: f32,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Search structure over the embeddings of one collection.
///
/// Implementations are not internally synchronized; the owning collection's
/// lock serializes mutation against queries.
pub trait VectorIndex: Send + Sync + Debug {
    fn metric(&self) -> DistanceMetric;

    fn dimension(&self) -> Option<usize>;

    /// Insert a new id. Callers remove an existing id first to replace it.
    fn insert(&mut self, id: &str, vector: &[f32]) -> Result<(), IndexError>;

    fn remove(&mut self, id: &str) -> bool;

    fn contains(&self, id: &str) -> bool;

    /// Up to `k` neighbors of `vector`, nearest first.
    fn query(&self, vector: &[f32], k: usize) -> Vec<Neighbor>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `query` returns the true nearest neighbors.
    fn is_exact(&self) -> bool;
}
