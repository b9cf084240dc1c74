// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use super::document_store::DocumentStore;
use crate::core::error::{StoreError, StoreResult};
use crate::core::types::{CollectionInfo, CollectionSummary, DistanceMetric, DocumentRecord};
use crate::core::vector_ops::is_finite;
use crate::index::{FlatIndex, VectorIndex};
use crate::storage::{CollectionPersister, LoadedCollection, LogStats};
use tracing::{debug, warn};

/// In-memory state of one loaded collection.
///
/// Mutations write to the persister first and only then touch the document
/// store and index, so memory never holds state the log does not.
#[derive(Debug)]
pub struct Collection {
    info: CollectionInfo,
    documents: DocumentStore,
    index: Box<dyn VectorIndex>,
    log: LogStats,
    // Set while a mutation is between its durable write and its in-memory
    // update. Still set afterwards means the mutation was interrupted.
    write_pending: bool,
}

impl Collection {
    pub fn new(info: CollectionInfo) -> Self {
        let index = FlatIndex::new(info.metric, info.dimension);
        Self {
            info,
            documents: DocumentStore::new(),
            index: Box::new(index),
            log: LogStats::default(),
            write_pending: false,
        }
    }

    /// Rebuild from replayed durable state.
    pub fn from_loaded(loaded: LoadedCollection) -> StoreResult<Self> {
        let mut collection = Self::new(loaded.info);
        for record in loaded.records {
            collection
                .index
                .insert(&record.id, &record.embedding)
                .map_err(|e| StoreError::invariant(&collection.info.name, e))?;
            collection.documents.upsert(record);
        }
        collection.log = loaded.log;
        Ok(collection)
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn metric(&self) -> DistanceMetric {
        self.info.metric
    }

    pub fn dimension(&self) -> Option<usize> {
        self.info.dimension
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn index_mut(&mut self) -> &mut dyn VectorIndex {
        &mut *self.index
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn log_stats(&self) -> LogStats {
        self.log
    }

    /// False if a mutation was abandoned after reaching the log, in which
    /// case memory must be rebuilt by replay.
    pub fn is_consistent(&self) -> bool {
        !self.write_pending
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            name: self.info.name.clone(),
            count: self.documents.len(),
            dimension: self.info.dimension,
            metric: self.info.metric,
            metadata: self.info.metadata.clone(),
        }
    }

    /// Insert or replace a document.
    pub async fn add(
        &mut self,
        persister: &CollectionPersister,
        record: DocumentRecord,
    ) -> StoreResult<DocumentRecord> {
        validate_record(&record)?;

        let fixes_dimension = match self.info.dimension {
            Some(expected) if expected != record.dimension() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: record.dimension(),
                });
            }
            Some(_) => false,
            None => true,
        };

        self.write_pending = true;
        let bytes = persister.append_record(&self.info.name, &record).await?;
        self.log.frames += 1;
        self.log.bytes += bytes;

        // The log is the commit point. Replay infers the dimension from the
        // first record if this save never lands.
        if fixes_dimension {
            let mut info = self.info.clone();
            info.dimension = Some(record.dimension());
            match persister.save_info(&info).await {
                Ok(()) => {
                    debug!(collection = %info.name, dimension = record.dimension(), "fixed collection dimension")
                }
                Err(e) => warn!(
                    collection = %info.name,
                    error = %e,
                    "failed to record collection dimension, it will be inferred on load"
                ),
            }
            self.info = info;
        }

        let replaced = self.documents.upsert(record.clone()).is_some();
        self.index.remove(&record.id);
        self.index
            .insert(&record.id, &record.embedding)
            .map_err(|e| StoreError::invariant(&self.info.name, e))?;
        self.write_pending = false;

        debug!(collection = %self.info.name, id = %record.id, replaced, "added document");
        self.maybe_compact(persister).await;
        Ok(record)
    }

    pub async fn delete(
        &mut self,
        persister: &CollectionPersister,
        id: &str,
    ) -> StoreResult<DocumentRecord> {
        if !self.documents.contains(id) {
            return Err(StoreError::DocumentNotFound {
                collection: self.info.name.clone(),
                id: id.to_string(),
            });
        }

        self.write_pending = true;
        let bytes = persister.remove_record(&self.info.name, id).await?;
        self.log.frames += 1;
        self.log.bytes += bytes;

        let record = self.documents.remove(id).ok_or_else(|| StoreError::InvariantViolation {
            collection: self.info.name.clone(),
            detail: format!("document '{}' vanished during delete", id),
        })?;
        if !self.index.remove(id) {
            return Err(StoreError::InvariantViolation {
                collection: self.info.name.clone(),
                detail: format!("index had no entry for document '{}'", id),
            });
        }
        self.write_pending = false;

        debug!(collection = %self.info.name, id, "deleted document");
        self.maybe_compact(persister).await;
        Ok(record)
    }

    async fn maybe_compact(&mut self, persister: &CollectionPersister) {
        if !persister
            .policy()
            .should_compact(&self.log, self.documents.len())
        {
            return;
        }
        match persister.compact(&self.info.name, self.documents.iter()).await {
            Ok(stats) => self.log = stats,
            Err(e) => warn!(collection = %self.info.name, error = %e, "log compaction failed"),
        }
    }
}

fn validate_record(record: &DocumentRecord) -> StoreResult<()> {
    if record.id.is_empty() {
        return Err(StoreError::InvalidArgument(
            "document id must not be empty".to_string(),
        ));
    }
    if record.embedding.is_empty() {
        return Err(StoreError::InvalidArgument(format!(
            "document '{}' has an empty embedding",
            record.id
        )));
    }
    if !is_finite(&record.embedding) {
        return Err(StoreError::InvalidArgument(format!(
            "document '{}' has non-finite embedding values",
            record.id
        )));
    }
    Ok(())
}
