// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::DocumentRecord;
use std::collections::{BTreeMap, HashMap};

/// Documents of one collection keyed by id, iterable in insertion order.
///
/// Every id gets a sequence number on first insert. Replacing a document
/// keeps its number; deleting and re-adding assigns a new one.
#[derive(Debug, Default)]
pub struct DocumentStore {
    records: HashMap<String, (u64, DocumentRecord)>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the previous record for the id.
    pub fn upsert(&mut self, record: DocumentRecord) -> Option<DocumentRecord> {
        if let Some((_, existing)) = self.records.get_mut(&record.id) {
            return Some(std::mem::replace(existing, record));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, record.id.clone());
        self.records.insert(record.id.clone(), (seq, record));
        None
    }

    pub fn remove(&mut self, id: &str) -> Option<DocumentRecord> {
        let (seq, record) = self.records.remove(id)?;
        self.order.remove(&seq);
        Some(record)
    }

    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.records.get(id).map(|(_, record)| record)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.order
            .values()
            .filter_map(move |id| self.records.get(id).map(|(_, record)| record))
    }

    /// Up to `limit` records after cursor `after`, with the cursor to resume
    /// from. The cursor is `None` once the end is reached.
    pub fn page_after(
        &self,
        after: Option<u64>,
        limit: usize,
    ) -> (Vec<DocumentRecord>, Option<u64>) {
        let start = after.map_or(0, |seq| seq + 1);
        let mut page = Vec::with_capacity(limit.min(self.len()));
        let mut last = None;

        for (seq, id) in self.order.range(start..) {
            if page.len() == limit {
                return (page, last);
            }
            if let Some((_, record)) = self.records.get(id) {
                page.push(record.clone());
                last = Some(*seq);
            }
        }
        (page, None)
    }
}
