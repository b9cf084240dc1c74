// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Nearest-neighbour queries against one collection.
//!
//! Text input is embedded before any collection lock is taken. The search
//! itself runs under the caller's shared lock and joins index hits with the
//! document store.

use crate::collection::Collection;
use crate::core::error::{StoreError, StoreResult};
use crate::core::metadata_filter::{FilterError, MetadataFilter};
use crate::core::types::{DocumentRecord, QueryResult};
use crate::core::vector_ops::is_finite;
use crate::embedding::EmbeddingProvider;
use crate::index::Neighbor;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_K: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Text(String),
    Vector(Vec<f32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub input: QueryInput,
    pub k: usize,
    pub filter: Option<MetadataFilter>,
    /// Keep only documents whose text contains this substring.
    pub document_contains: Option<String>,
}

impl QueryRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(QueryInput::Text(text.into()))
    }

    pub fn vector(vector: Vec<f32>) -> Self {
        Self::new(QueryInput::Vector(vector))
    }

    fn new(input: QueryInput) -> Self {
        Self {
            input,
            k: DEFAULT_K,
            filter: None,
            document_contains: None,
        }
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the filter from a `where` clause such as `{"year": {"$gte": 2020}}`.
    pub fn where_json(self, clause: &JsonValue) -> Result<Self, FilterError> {
        Ok(self.filter(MetadataFilter::from_json(clause)?))
    }

    pub fn document_contains(mut self, needle: impl Into<String>) -> Self {
        self.document_contains = Some(needle.into());
        self
    }

    fn is_filtered(&self) -> bool {
        self.filter.is_some() || self.document_contains.is_some()
    }

    fn accepts(&self, record: &DocumentRecord) -> bool {
        let metadata_ok = self
            .filter
            .as_ref()
            .map_or(true, |filter| filter.matches(&record.metadata));
        let text_ok = self
            .document_contains
            .as_ref()
            .map_or(true, |needle| record.text.contains(needle.as_str()));
        metadata_ok && text_ok
    }
}

/// Ranked results plus ids the index returned but the document store lacked.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<QueryResult>,
    pub missing: Vec<String>,
}

pub struct QueryEngine {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    timeout: Duration,
    overfetch: usize,
}

impl QueryEngine {
    pub fn new(
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        timeout: Duration,
        overfetch: usize,
    ) -> Self {
        Self {
            embedder,
            timeout,
            overfetch: overfetch.max(1),
        }
    }

    pub fn embedder(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.embedder.as_ref()
    }

    /// Embed document `text`, bounded by the configured timeout.
    pub async fn embed(&self, text: &str) -> StoreResult<Vec<f32>> {
        self.embed_bounded(text, false).await
    }

    /// Embed search `text`, bounded by the configured timeout.
    pub async fn embed_query(&self, text: &str) -> StoreResult<Vec<f32>> {
        self.embed_bounded(text, true).await
    }

    async fn embed_bounded(&self, text: &str, is_query: bool) -> StoreResult<Vec<f32>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            StoreError::EmbeddingFailed("no embedding provider configured".to_string())
        })?;

        let call = if is_query {
            embedder.embed_query(text)
        } else {
            embedder.embed(text)
        };
        let vector = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                warn!(provider = embedder.name(), error = %e, "embedding failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(provider = embedder.name(), timeout = ?self.timeout, "embedding timed out");
                return Err(StoreError::EmbeddingTimeout(self.timeout));
            }
        };

        if vector.is_empty() || !is_finite(&vector) {
            return Err(StoreError::EmbeddingFailed(format!(
                "{} returned an empty or non-finite embedding",
                embedder.name()
            )));
        }
        Ok(vector)
    }

    pub async fn resolve_vector(&self, input: &QueryInput) -> StoreResult<Vec<f32>> {
        match input {
            QueryInput::Text(text) => self.embed_query(text).await,
            QueryInput::Vector(vector) => {
                if vector.is_empty() || !is_finite(vector) {
                    return Err(StoreError::InvalidArgument(
                        "query vector must be non-empty and finite".to_string(),
                    ));
                }
                Ok(vector.clone())
            }
        }
    }

    /// Rank the documents of `collection` by distance to `vector`.
    pub fn search(
        &self,
        collection: &Collection,
        vector: &[f32],
        request: &QueryRequest,
    ) -> StoreResult<SearchOutcome> {
        if let Some(expected) = collection.dimension() {
            if expected != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        let k = request.k;
        if k == 0 || collection.is_empty() {
            return Ok(SearchOutcome::default());
        }

        let index = collection.index();
        let mut outcome = if request.is_filtered() {
            let fetch = k.saturating_mul(self.overfetch);
            let hits = index.query(vector, fetch);
            let exhausted = hits.len() < fetch || fetch >= index.len();
            let outcome = collect(collection, hits, request, k);

            if outcome.results.len() < k && !exhausted {
                debug!(
                    collection = collection.name(),
                    fetched = fetch,
                    matched = outcome.results.len(),
                    "filter left too few candidates, scanning whole collection"
                );
                collect(collection, index.query(vector, index.len()), request, k)
            } else {
                outcome
            }
        } else {
            collect(collection, index.query(vector, k), request, k)
        };

        for (rank, result) in outcome.results.iter_mut().enumerate() {
            result.rank = rank;
        }
        Ok(outcome)
    }
}

fn collect(
    collection: &Collection,
    hits: Vec<Neighbor>,
    request: &QueryRequest,
    k: usize,
) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();
    for hit in hits {
        if outcome.results.len() == k {
            break;
        }
        match collection.documents().get(&hit.id) {
            Some(record) if request.accepts(record) => outcome.results.push(QueryResult {
                id: hit.id,
                distance: hit.distance,
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                rank: 0,
            }),
            Some(_) => {}
            None => {
                error!(
                    collection = collection.name(),
                    id = %hit.id,
                    "index returned a document the store does not hold"
                );
                outcome.missing.push(hit.id);
            }
        }
    }
    outcome
}
