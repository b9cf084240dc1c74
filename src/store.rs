// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::collection::CollectionManager;
use crate::core::config::StoreConfig;
use crate::core::error::{StoreError, StoreResult};
use crate::core::types::{
    CollectionInfo, CollectionOptions, CollectionSummary, DocumentRecord, Metadata, QueryResult,
};
use crate::embedding::EmbeddingProvider;
use crate::query::{QueryEngine, QueryRequest};
use crate::storage::{CollectionPersister, CompactionPolicy, FileStorage, Storage};
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Persistent store of named document collections.
///
/// Every method names its collection explicitly; there is no ambient
/// "current collection". All methods are safe to call concurrently.
pub struct VectorStore {
    config: StoreConfig,
    manager: CollectionManager,
    engine: QueryEngine,
}

impl VectorStore {
    /// Open (or create) a store on the local file system at `config.data_dir`.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let storage = FileStorage::open(&config.data_dir).await?;
        info!(data_dir = %config.data_dir.display(), "opening vector store");
        Self::open_with_storage(config, Arc::new(storage)).await
    }

    pub async fn open_with_storage(
        config: StoreConfig,
        storage: Arc<dyn Storage>,
    ) -> StoreResult<Self> {
        config.validate()?;
        let policy = CompactionPolicy {
            min_dead: config.compaction_min_dead,
            ratio: config.compaction_ratio,
        };
        let persister = CollectionPersister::new(storage, policy);
        let manager = CollectionManager::open(persister, config.default_metric).await?;
        let engine = QueryEngine::new(None, config.embedding_timeout, config.filter_overfetch);

        Ok(Self {
            config,
            manager,
            engine,
        })
    }

    /// Use `embedder` for `add_text` and text queries.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        info!(provider = embedder.name(), "embedding provider attached");
        self.engine = QueryEngine::new(
            Some(embedder),
            self.config.embedding_timeout,
            self.config.filter_overfetch,
        );
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn create_or_get_collection(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> StoreResult<CollectionInfo> {
        self.manager
            .create_or_get(name, CollectionOptions::with_metadata(metadata))
            .await
    }

    pub async fn create_or_get_collection_with(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> StoreResult<CollectionInfo> {
        self.manager.create_or_get(name, options).await
    }

    pub async fn get_collection(&self, name: &str) -> StoreResult<CollectionInfo> {
        self.manager.get(name).await
    }

    pub async fn list_collections(&self) -> StoreResult<Vec<CollectionSummary>> {
        self.manager.list().await
    }

    pub async fn drop_collection(&self, name: &str) -> StoreResult<()> {
        self.manager.drop(name).await
    }

    /// Insert or replace a document. Returns the committed record.
    pub async fn add_document(
        &self,
        collection: &str,
        record: DocumentRecord,
    ) -> StoreResult<DocumentRecord> {
        self.manager.add(collection, record).await
    }

    /// Embed `text` with the attached provider, then add it.
    pub async fn add_text(
        &self,
        collection: &str,
        id: &str,
        text: &str,
        metadata: Metadata,
    ) -> StoreResult<DocumentRecord> {
        // Fail fast before paying for an embedding call.
        self.manager.get(collection).await?;
        let embedding = self.engine.embed(text).await?;
        let record = DocumentRecord::new(id, text, embedding).with_metadata(metadata);
        self.manager.add(collection, record).await
    }

    pub async fn get_document(&self, collection: &str, id: &str) -> StoreResult<DocumentRecord> {
        self.manager.get_document(collection, id).await
    }

    /// Every document of `collection` in insertion order, fetched lazily one
    /// page at a time. Each page is read under its own short shared lock, so
    /// writes interleaving with a long listing are allowed.
    pub fn list_documents<'a>(
        &'a self,
        collection: &str,
    ) -> impl Stream<Item = StoreResult<DocumentRecord>> + 'a {
        let manager = &self.manager;
        let name = collection.to_string();
        let page_size = self.config.list_page_size;

        stream::try_unfold(Some(None), move |cursor: Option<Option<u64>>| {
            let name = name.clone();
            async move {
                let after = match cursor {
                    Some(after) => after,
                    None => return Ok::<_, StoreError>(None),
                };
                let (page, next) = manager.page(&name, after, page_size).await?;
                if page.is_empty() {
                    return Ok(None);
                }
                let records = stream::iter(page.into_iter().map(Ok::<_, StoreError>));
                Ok(Some((records, next.map(Some))))
            }
        })
        .try_flatten()
    }

    /// The first `limit` documents in insertion order.
    pub async fn peek(&self, collection: &str, limit: usize) -> StoreResult<Vec<DocumentRecord>> {
        self.manager.peek(collection, limit).await
    }

    pub async fn delete_document(&self, collection: &str, id: &str) -> StoreResult<DocumentRecord> {
        self.manager.delete(collection, id).await
    }

    pub async fn query(
        &self,
        collection: &str,
        request: QueryRequest,
    ) -> StoreResult<Vec<QueryResult>> {
        let vector = self.engine.resolve_vector(&request.input).await?;

        let outcome = {
            let guard = self.manager.read(collection).await?;
            self.engine.search(&guard, &vector, &request)?
        };
        if !outcome.missing.is_empty() {
            self.manager.invalidate(collection).await;
        }

        debug!(
            collection,
            k = request.k,
            results = outcome.results.len(),
            "query complete"
        );
        Ok(outcome.results)
    }

    pub async fn count(&self, collection: &str) -> StoreResult<usize> {
        self.manager.count(collection).await
    }
}
