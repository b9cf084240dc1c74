// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::error::StoreError;
use crate::core::types::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding `collections/` and `.trash/`.
    pub data_dir: PathBuf,
    /// Metric for collections created without an explicit one.
    pub default_metric: DistanceMetric,
    #[serde(with = "duration_millis")]
    pub embedding_timeout: Duration,
    /// Candidates fetched per requested result when a filter is present.
    pub filter_overfetch: usize,
    /// Compact once dead log frames make up at least this share of the log.
    pub compaction_ratio: f64,
    /// ...and there are at least this many dead frames.
    pub compaction_min_dead: usize,
    /// Records fetched per lock acquisition by `list_documents`.
    pub list_page_size: usize,
}

// std::time::Duration as whole milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("vector_store_db"),
            default_metric: DistanceMetric::SquaredEuclidean,
            embedding_timeout: Duration::from_secs(30),
            filter_overfetch: 4,
            compaction_ratio: 0.5,
            compaction_min_dead: 64,
            list_page_size: 256,
        }
    }
}

impl StoreConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `VECTOR_STORE_*` environment variables,
    /// falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            data_dir: lookup("VECTOR_STORE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            default_metric: lookup("VECTOR_STORE_METRIC")
                .and_then(|m| m.parse().ok())
                .unwrap_or(defaults.default_metric),
            embedding_timeout: lookup("VECTOR_STORE_EMBEDDING_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.embedding_timeout),
            filter_overfetch: lookup("VECTOR_STORE_FILTER_OVERFETCH")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.filter_overfetch),
            compaction_ratio: lookup("VECTOR_STORE_COMPACTION_RATIO")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compaction_ratio),
            compaction_min_dead: lookup("VECTOR_STORE_COMPACTION_MIN_DEAD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compaction_min_dead),
            list_page_size: lookup("VECTOR_STORE_LIST_PAGE_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.list_page_size),
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.filter_overfetch == 0 {
            return Err(StoreError::InvalidArgument(
                "filter_overfetch must be at least 1".to_string(),
            ));
        }
        if self.list_page_size == 0 {
            return Err(StoreError::InvalidArgument(
                "list_page_size must be at least 1".to_string(),
            ));
        }
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            return Err(StoreError::InvalidArgument(format!(
                "compaction_ratio must be in (0, 1], got {}",
                self.compaction_ratio
            )));
        }
        if self.embedding_timeout.is_zero() {
            return Err(StoreError::InvalidArgument(
                "embedding_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
