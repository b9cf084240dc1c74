// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod core;
pub mod document_store;
pub mod manager;

pub use self::core::Collection;
pub use self::document_store::DocumentStore;
pub use self::manager::{
    validate_collection_name, CollectionManager, CollectionReadGuard, CollectionSlot,
    CollectionWriteGuard,
};
