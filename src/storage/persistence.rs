// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::{CollectionInfo, DocumentRecord, FORMAT_VERSION};
use crate::storage::backend::{Storage, StorageError};
use crate::storage::log::{decode_frames, encode_frame, LogEntry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const COLLECTIONS_DIR: &str = "collections";
pub const INFO_FILE: &str = "collection.cbor";
pub const LOG_FILE: &str = "documents.log";

/// When to rewrite a document log without its dead frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionPolicy {
    pub min_dead: usize,
    pub ratio: f64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            min_dead: 64,
            ratio: 0.5,
        }
    }
}

impl CompactionPolicy {
    pub fn should_compact(&self, log: &LogStats, live: usize) -> bool {
        let dead = log.frames.saturating_sub(live);
        log.frames > 0 && dead >= self.min_dead && dead as f64 / log.frames as f64 >= self.ratio
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub frames: usize,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct LoadedCollection {
    pub info: CollectionInfo,
    /// Live records in insertion order.
    pub records: Vec<DocumentRecord>,
    pub log: LogStats,
}

/// Durable per-collection state:
///
/// ```text
/// collections/<name>/collection.cbor   CollectionInfo, replaced atomically
/// collections/<name>/documents.log     append-only LogEntry frames
/// ```
pub struct CollectionPersister {
    storage: Arc<dyn Storage>,
    policy: CompactionPolicy,
}

impl CollectionPersister {
    pub fn new(storage: Arc<dyn Storage>, policy: CompactionPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn policy(&self) -> &CompactionPolicy {
        &self.policy
    }

    fn collection_dir(name: &str) -> String {
        format!("{}/{}", COLLECTIONS_DIR, name)
    }

    fn info_path(name: &str) -> String {
        format!("{}/{}/{}", COLLECTIONS_DIR, name, INFO_FILE)
    }

    fn log_path(name: &str) -> String {
        format!("{}/{}/{}", COLLECTIONS_DIR, name, LOG_FILE)
    }

    /// Names of every collection with a committed `collection.cbor`.
    pub async fn list_collections(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for dir in self.storage.list_dirs(COLLECTIONS_DIR).await? {
            if self.storage.exists(&Self::info_path(&dir)).await? {
                names.push(dir);
            } else {
                warn!(collection = %dir, "ignoring collection directory without {}", INFO_FILE);
            }
        }
        Ok(names)
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        self.storage.exists(&Self::info_path(name)).await
    }

    pub async fn save_info(&self, info: &CollectionInfo) -> Result<(), StorageError> {
        let bytes =
            serde_cbor::to_vec(info).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage
            .write_atomic(&Self::info_path(&info.name), bytes)
            .await
    }

    /// Durably log a put of `record`. Returns the frame size in bytes.
    pub async fn append_record(
        &self,
        collection: &str,
        record: &DocumentRecord,
    ) -> Result<u64, StorageError> {
        self.append_entry(collection, &LogEntry::Put(record.clone()))
            .await
    }

    /// Durably log a tombstone for `id`. Returns the frame size in bytes.
    pub async fn remove_record(&self, collection: &str, id: &str) -> Result<u64, StorageError> {
        self.append_entry(collection, &LogEntry::Delete { id: id.to_string() })
            .await
    }

    async fn append_entry(&self, collection: &str, entry: &LogEntry) -> Result<u64, StorageError> {
        let frame = encode_frame(entry)?;
        self.storage
            .append(&Self::log_path(collection), &frame)
            .await?;
        Ok(frame.len() as u64)
    }

    /// Replay the durable state of `name`. `None` if the collection does not exist.
    pub async fn load_collection(
        &self,
        name: &str,
    ) -> Result<Option<LoadedCollection>, StorageError> {
        let info_path = Self::info_path(name);
        let info_bytes = match self.storage.read(&info_path).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let mut info: CollectionInfo =
            serde_cbor::from_slice(&info_bytes).map_err(|e| StorageError::Corrupt {
                path: info_path.clone(),
                reason: e.to_string(),
            })?;
        if info.version > FORMAT_VERSION {
            return Err(StorageError::IncompatibleVersion {
                found: info.version,
                expected: FORMAT_VERSION,
            });
        }
        if info.name != name {
            return Err(StorageError::Corrupt {
                path: info_path,
                reason: format!("names collection '{}'", info.name),
            });
        }

        let log_path = Self::log_path(name);
        let data = self.storage.read(&log_path).await?.unwrap_or_default();
        let decoded = decode_frames(&data);
        if let Some(reason) = decoded.corruption {
            return Err(StorageError::Corrupt {
                path: log_path,
                reason,
            });
        }
        if let Some(reason) = &decoded.tail_error {
            warn!(
                collection = name,
                reason = %reason,
                discarded_bytes = data.len() as u64 - decoded.valid_len,
                "discarding torn document log tail"
            );
            self.storage.truncate(&log_path, decoded.valid_len).await?;
        }

        let frames = decoded.entries.len();
        let records = replay(decoded.entries);

        // The first add logs its record before recording the dimension.
        let inferred = info.dimension.is_none() && !records.is_empty();
        if inferred {
            info.dimension = records.first().map(DocumentRecord::dimension);
        }
        if let Some(dimension) = info.dimension {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
                return Err(StorageError::Corrupt {
                    path: log_path,
                    reason: format!(
                        "document '{}' has dimension {}, collection has {}",
                        bad.id,
                        bad.embedding.len(),
                        dimension
                    ),
                });
            }
            if inferred {
                info!(collection = name, dimension, "inferred dimension from document log");
                if let Err(e) = self.save_info(&info).await {
                    warn!(collection = name, error = %e, "failed to record inferred dimension");
                }
            }
        }

        debug!(collection = name, frames, live = records.len(), "replayed document log");
        Ok(Some(LoadedCollection {
            info,
            records,
            log: LogStats {
                frames,
                bytes: decoded.valid_len,
            },
        }))
    }

    pub async fn drop_collection(&self, name: &str) -> Result<(), StorageError> {
        self.storage.remove_dir(&Self::collection_dir(name)).await
    }

    /// Rewrite the log of `name` to hold exactly `records`, in order.
    pub async fn compact<'a, I>(&self, name: &str, records: I) -> Result<LogStats, StorageError>
    where
        I: IntoIterator<Item = &'a DocumentRecord>,
    {
        let mut data = Vec::new();
        let mut frames = 0;
        for record in records {
            data.extend_from_slice(&encode_frame(&LogEntry::Put(record.clone()))?);
            frames += 1;
        }
        let bytes = data.len() as u64;

        self.storage.write_atomic(&Self::log_path(name), data).await?;
        info!(collection = name, frames, bytes, "compacted document log");
        Ok(LogStats { frames, bytes })
    }
}

/// Fold log entries into the live record set. The last put for an id wins
/// and keeps the position of its first put; a delete frees the position, so
/// a later re-add lands at the end.
pub fn replay(entries: Vec<LogEntry>) -> Vec<DocumentRecord> {
    let mut slots: Vec<Option<DocumentRecord>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        match entry {
            LogEntry::Put(record) => match positions.get(&record.id) {
                Some(&pos) => slots[pos] = Some(record),
                None => {
                    positions.insert(record.id.clone(), slots.len());
                    slots.push(Some(record));
                }
            },
            LogEntry::Delete { id } => {
                if let Some(pos) = positions.remove(&id) {
                    slots[pos] = None;
                }
            }
        }
    }

    slots.into_iter().flatten().collect()
}
