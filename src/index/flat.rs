// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use super::{IndexError, Neighbor, VectorIndex};
use crate::core::types::DistanceMetric;
use std::collections::{BinaryHeap, HashMap};

/// Exact brute-force index. Vectors live in one contiguous buffer so a scan
/// walks memory linearly; removal swaps the last vector into the hole.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    metric: DistanceMetric,
    dimension: Option<usize>,
    ids: Vec<String>,
    vectors: Vec<f32>,
    slots: HashMap<String, usize>,
}

impl FlatIndex {
    pub fn new(metric: DistanceMetric, dimension: Option<usize>) -> Self {
        Self {
            metric,
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
            slots: HashMap::new(),
        }
    }

    fn vector_at(&self, slot: usize, dimension: usize) -> &[f32] {
        &self.vectors[slot * dimension..(slot + 1) * dimension]
    }
}

impl VectorIndex for FlatIndex {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn insert(&mut self, id: &str, vector: &[f32]) -> Result<(), IndexError> {
        if self.slots.contains_key(id) {
            return Err(IndexError::DuplicateId(id.to_string()));
        }
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }

        self.slots.insert(id.to_string(), self.ids.len());
        self.ids.push(id.to_string());
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        let slot = match self.slots.remove(id) {
            Some(slot) => slot,
            None => return false,
        };
        let dimension = self.dimension.unwrap_or(0);
        let last = self.ids.len() - 1;

        if slot != last {
            let (head, tail) = self.vectors.split_at_mut(last * dimension);
            head[slot * dimension..(slot + 1) * dimension].copy_from_slice(&tail[..dimension]);
            let moved = self.ids[last].clone();
            self.slots.insert(moved, slot);
        }
        self.ids.swap_remove(slot);
        self.vectors.truncate(last * dimension);
        true
    }

    fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    fn query(&self, vector: &[f32], k: usize) -> Vec<Neighbor> {
        let dimension = match self.dimension {
            Some(d) if d == vector.len() => d,
            _ => return Vec::new(),
        };
        if k == 0 {
            return Vec::new();
        }

        // Max-heap of the k best so far; the root is the worst kept hit.
        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
        for (slot, id) in self.ids.iter().enumerate() {
            let distance = self.metric.distance(vector, self.vector_at(slot, dimension));
            if heap.len() < k {
                heap.push(Neighbor {
                    id: id.clone(),
                    distance,
                });
                continue;
            }
            let candidate = Neighbor {
                id: id.clone(),
                distance,
            };
            if heap.peek().map_or(false, |worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        heap.into_sorted_vec()
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn is_exact(&self) -> bool {
        true
    }
}
