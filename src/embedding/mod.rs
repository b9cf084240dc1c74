// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod gemini;

pub use self::gemini::GeminiEmbedding;

use crate::core::vector_ops::normalize;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding provider misconfigured: {0}")]
    Configuration(String),

    #[error("Cannot embed input: {0}")]
    InvalidInput(String),
}

/// Turns text into a vector. Called outside any collection lock; the store
/// bounds every call with its embedding timeout.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a document for storage.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed search text. Providers with asymmetric retrieval models
    /// override this; the result must be comparable with `embed` output.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }

    /// Output length, if fixed and known up front.
    fn dimension(&self) -> Option<usize>;

    fn name(&self) -> &str;
}

/// Offline provider using signed feature hashing of lowercased word tokens.
/// Deterministic across runs and machines; the output is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::Configuration(
                "dimension must be at least 1".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text is empty".to_string()));
        }

        let lowered = text.to_lowercase();
        let mut tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            tokens.push(lowered.as_str());
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let normalized = normalize(&vector);
        if normalized.iter().all(|x| *x == 0.0) {
            // Every token cancelled out; fall back to a fixed direction.
            let mut unit = vec![0.0; self.dimension];
            unit[0] = 1.0;
            return Ok(unit);
        }
        Ok(normalized)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn name(&self) -> &str {
        "hash"
    }
}
