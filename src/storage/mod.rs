// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod backend;
pub mod log;
pub mod persistence;

pub use backend::{FileStorage, MemoryStorage, Storage, StorageError, TRASH_DIR};
pub use log::{decode_frames, encode_frame, DecodedLog, LogEntry};
pub use persistence::{
    CollectionPersister, CompactionPolicy, LoadedCollection, LogStats, COLLECTIONS_DIR,
};
