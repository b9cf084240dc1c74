// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Registry of named collections.
//!
//! Each collection sits behind its own `tokio::sync::RwLock`: mutations take
//! it exclusively, reads share it. The `DashMap` only maps names to handles
//! and its guards are never held across an `.await`.

use super::core::Collection;
use crate::core::error::{StoreError, StoreResult};
use crate::core::types::{
    CollectionInfo, CollectionOptions, CollectionSummary, DistanceMetric, DocumentRecord,
};
use crate::storage::CollectionPersister;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockMappedWriteGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{error, info, warn};

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 63;

/// Load state of a registered collection.
#[derive(Debug)]
pub enum CollectionSlot {
    /// Known by name, not yet replayed into memory.
    Unloaded,
    Ready(Collection),
    /// Dropped. The handle is already out of the registry.
    Gone,
}

#[derive(Debug)]
struct CollectionHandle {
    name: String,
    slot: Arc<RwLock<CollectionSlot>>,
}

impl CollectionHandle {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            slot: Arc::new(RwLock::new(CollectionSlot::Unloaded)),
        })
    }
}

pub type CollectionReadGuard = OwnedRwLockReadGuard<CollectionSlot, Collection>;
pub type CollectionWriteGuard = OwnedRwLockMappedWriteGuard<CollectionSlot, Collection>;

pub struct CollectionManager {
    persister: CollectionPersister,
    collections: DashMap<String, Arc<CollectionHandle>>,
    default_metric: DistanceMetric,
}

impl CollectionManager {
    /// Register every collection found in storage. Nothing is replayed until
    /// a collection is first used.
    pub async fn open(
        persister: CollectionPersister,
        default_metric: DistanceMetric,
    ) -> StoreResult<Self> {
        let names = persister.list_collections().await?;
        let collections = DashMap::new();
        for name in &names {
            collections.insert(name.clone(), CollectionHandle::new(name));
        }
        info!(collections = names.len(), "opened collection registry");

        Ok(Self {
            persister,
            collections,
            default_metric,
        })
    }

    pub fn persister(&self) -> &CollectionPersister {
        &self.persister
    }

    pub fn default_metric(&self) -> DistanceMetric {
        self.default_metric
    }

    fn handle(&self, name: &str) -> StoreResult<Arc<CollectionHandle>> {
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn forget(&self, handle: &Arc<CollectionHandle>) {
        self.collections
            .remove_if(&handle.name, |_, current| Arc::ptr_eq(current, handle));
    }

    /// Make `slot` hold a consistent collection, replaying storage if needed.
    /// Returns `false` if the collection does not exist durably.
    async fn load_into(&self, name: &str, slot: &mut CollectionSlot) -> StoreResult<bool> {
        match slot {
            CollectionSlot::Ready(collection) if collection.is_consistent() => return Ok(true),
            CollectionSlot::Ready(_) => {
                warn!(collection = name, "reloading collection after an interrupted write");
            }
            CollectionSlot::Gone => return Ok(false),
            CollectionSlot::Unloaded => {}
        }
        *slot = CollectionSlot::Unloaded;

        match self.persister.load_collection(name).await? {
            Some(loaded) => {
                let collection = Collection::from_loaded(loaded).map_err(|e| {
                    error!(collection = name, error = %e, "durable state failed to rebuild");
                    e
                })?;
                info!(
                    collection = name,
                    documents = collection.len(),
                    "loaded collection"
                );
                *slot = CollectionSlot::Ready(collection);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Shared access to a loaded collection.
    pub async fn read(&self, name: &str) -> StoreResult<CollectionReadGuard> {
        loop {
            let handle = self.handle(name)?;
            let guard = handle.slot.clone().read_owned().await;
            if matches!(&*guard, CollectionSlot::Ready(c) if c.is_consistent()) {
                return OwnedRwLockReadGuard::try_map(guard, as_collection)
                    .map_err(|_| StoreError::CollectionNotFound(name.to_string()));
            }
            if matches!(*guard, CollectionSlot::Gone) {
                continue;
            }
            drop(guard);

            let mut guard = handle.slot.clone().write_owned().await;
            if matches!(*guard, CollectionSlot::Gone) {
                continue;
            }
            if !self.load_into(name, &mut guard).await? {
                return Err(StoreError::CollectionNotFound(name.to_string()));
            }
            return OwnedRwLockReadGuard::try_map(guard.downgrade(), as_collection)
                .map_err(|_| StoreError::CollectionNotFound(name.to_string()));
        }
    }

    /// Exclusive access to a loaded collection.
    pub async fn lock_write(&self, name: &str) -> StoreResult<CollectionWriteGuard> {
        loop {
            let handle = self.handle(name)?;
            let mut guard = handle.slot.clone().write_owned().await;
            if matches!(*guard, CollectionSlot::Gone) {
                continue;
            }
            if !self.load_into(name, &mut guard).await? {
                return Err(StoreError::CollectionNotFound(name.to_string()));
            }
            return OwnedRwLockWriteGuard::try_map(guard, as_collection_mut)
                .map_err(|_| StoreError::CollectionNotFound(name.to_string()));
        }
    }

    /// Discard the in-memory state of `name`; the next access replays it.
    pub async fn invalidate(&self, name: &str) {
        let handle = match self.handle(name) {
            Ok(handle) => handle,
            Err(_) => return,
        };
        let mut guard = handle.slot.write().await;
        if matches!(*guard, CollectionSlot::Ready(_)) {
            warn!(collection = name, "invalidated in-memory collection state");
            *guard = CollectionSlot::Unloaded;
        }
    }

    pub async fn create_or_get(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> StoreResult<CollectionInfo> {
        validate_collection_name(name)?;

        loop {
            let handle = self
                .collections
                .entry(name.to_string())
                .or_insert_with(|| CollectionHandle::new(name))
                .clone();
            let mut guard = handle.slot.clone().write_owned().await;
            if matches!(*guard, CollectionSlot::Gone) {
                continue;
            }

            if self.load_into(name, &mut guard).await? {
                if let CollectionSlot::Ready(collection) = &*guard {
                    return Ok(collection.info().clone());
                }
            }

            let info = CollectionInfo::new(
                name,
                options.metadata.clone(),
                options.metric.unwrap_or(self.default_metric),
            );
            if let Err(e) = self.persister.save_info(&info).await {
                *guard = CollectionSlot::Gone;
                self.forget(&handle);
                return Err(e.into());
            }
            info!(collection = name, metric = %info.metric, "created collection");
            *guard = CollectionSlot::Ready(Collection::new(info.clone()));
            return Ok(info);
        }
    }

    pub async fn get(&self, name: &str) -> StoreResult<CollectionInfo> {
        Ok(self.read(name).await?.info().clone())
    }

    /// Summaries of every collection, sorted by name.
    pub async fn list(&self) -> StoreResult<Vec<CollectionSummary>> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            match self.read(&name).await {
                Ok(collection) => summaries.push(collection.summary()),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    pub async fn drop(&self, name: &str) -> StoreResult<()> {
        let handle = self.handle(name)?;
        let mut guard = handle.slot.clone().write_owned().await;
        if matches!(*guard, CollectionSlot::Gone)
            || !self.persister.collection_exists(name).await?
        {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }

        self.persister.drop_collection(name).await?;
        *guard = CollectionSlot::Gone;
        self.forget(&handle);
        info!(collection = name, "dropped collection");
        Ok(())
    }

    pub async fn add(&self, name: &str, record: DocumentRecord) -> StoreResult<DocumentRecord> {
        let mut collection = self.lock_write(name).await?;
        let result = collection.add(&self.persister, record).await;
        result.map_err(|e| report(name, e))
    }

    pub async fn delete(&self, name: &str, id: &str) -> StoreResult<DocumentRecord> {
        let mut collection = self.lock_write(name).await?;
        let result = collection.delete(&self.persister, id).await;
        result.map_err(|e| report(name, e))
    }

    pub async fn get_document(&self, name: &str, id: &str) -> StoreResult<DocumentRecord> {
        let collection = self.read(name).await?;
        collection
            .documents()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound {
                collection: name.to_string(),
                id: id.to_string(),
            })
    }

    pub async fn count(&self, name: &str) -> StoreResult<usize> {
        Ok(self.read(name).await?.len())
    }

    pub async fn peek(&self, name: &str, limit: usize) -> StoreResult<Vec<DocumentRecord>> {
        let collection = self.read(name).await?;
        Ok(collection.documents().iter().take(limit).cloned().collect())
    }

    /// One page of documents in insertion order; see `DocumentStore::page_after`.
    pub async fn page(
        &self,
        name: &str,
        after: Option<u64>,
        limit: usize,
    ) -> StoreResult<(Vec<DocumentRecord>, Option<u64>)> {
        let collection = self.read(name).await?;
        Ok(collection.documents().page_after(after, limit))
    }
}

fn as_collection(slot: &CollectionSlot) -> Option<&Collection> {
    match slot {
        CollectionSlot::Ready(collection) => Some(collection),
        _ => None,
    }
}

fn as_collection_mut(slot: &mut CollectionSlot) -> Option<&mut Collection> {
    match slot {
        CollectionSlot::Ready(collection) => Some(collection),
        _ => None,
    }
}

fn report(name: &str, err: StoreError) -> StoreError {
    if !err.requires_reload() {
        return err;
    }
    if matches!(err, StoreError::InvariantViolation { .. }) {
        error!(collection = name, error = %err, "invariant violated, collection will be reloaded");
    } else {
        warn!(collection = name, error = %err, "durable write failed, collection will be reloaded");
    }
    err
}

/// Collection names: 3-63 characters from `[A-Za-z0-9._-]`, starting and
/// ending with an alphanumeric, without `..`.
pub fn validate_collection_name(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| {
        Err(StoreError::InvalidArgument(format!(
            "invalid collection name '{}': {}",
            name, reason
        )))
    };

    if name.len() < MIN_NAME_LEN || name.len() > MAX_NAME_LEN {
        return invalid("must be 3 to 63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return invalid("may only contain letters, digits, '.', '_' and '-'");
    }
    let alnum = |c: Option<char>| c.map_or(false, |c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("must not contain '..'");
    }
    Ok(())
}
