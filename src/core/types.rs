// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Current on-disk format version of `CollectionInfo`.
pub const FORMAT_VERSION: u32 = 1;

/// Primitive metadata value attached to documents and collections.
///
/// Serialized untagged, so `{"year": 2024, "draft": false}` round-trips
/// through JSON and CBOR as plain scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Equality used by filters: ints and floats compare numerically,
    /// everything else must match variant and value.
    pub fn loose_eq(&self, other: &MetadataValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Numeric ordering; `None` when either side is not a number.
    pub fn numeric_cmp(&self, other: &MetadataValue) -> Option<Ordering> {
        self.as_f64()?.partial_cmp(&other.as_f64()?)
    }

    /// Convert a JSON scalar. Arrays, objects and null have no metadata form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(MetadataValue::Int(i)),
                None => n.as_f64().map(MetadataValue::Float),
            },
            serde_json::Value::String(s) => Some(MetadataValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Int(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

/// Key-value metadata. Ordered so serialized bytes are deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Distance function used by a collection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Sum of squared component differences.
    #[default]
    #[serde(alias = "l2")]
    SquaredEuclidean,
    /// `1 - cosine_similarity`; a zero vector is at distance 1 from everything.
    Cosine,
    /// `1 - dot(a, b)`, meaningful for normalized embeddings.
    #[serde(alias = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::SquaredEuclidean => "squared_euclidean",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::InnerProduct => "inner_product",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" | "squared_euclidean" => Ok(DistanceMetric::SquaredEuclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            "ip" | "inner_product" => Ok(DistanceMetric::InnerProduct),
            other => Err(format!("unknown distance metric '{}'", other)),
        }
    }
}

/// One stored document: text, its embedding and optional metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// Durable description of a collection, stored as `collection.cbor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub version: u32,
    pub name: String,
    pub metric: DistanceMetric,
    /// Fixed by the first successful add and never changed afterwards.
    pub dimension: Option<usize>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl CollectionInfo {
    pub fn new(name: impl Into<String>, metadata: Metadata, metric: DistanceMetric) -> Self {
        Self {
            version: FORMAT_VERSION,
            name: name.into(),
            metric,
            dimension: None,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Options for `create_or_get`. Ignored when the collection already exists.
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    pub metadata: Metadata,
    pub metric: Option<DistanceMetric>,
}

impl CollectionOptions {
    pub fn with_metadata(metadata: Metadata) -> Self {
        Self {
            metadata,
            metric: None,
        }
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = Some(metric);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub count: usize,
    pub dimension: Option<usize>,
    pub metric: DistanceMetric,
    pub metadata: Metadata,
}

/// A ranked query hit. `rank` 0 is the nearest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub distance: f32,
    pub text: String,
    pub metadata: Metadata,
    pub rank: usize,
}
