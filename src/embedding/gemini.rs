// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use super::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "models/embedding-001";
const EMBEDDING_001_DIMENSION: usize = 768;

/// Gemini `embedContent` task hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
    SemanticSimilarity,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Google Gemini embedding API client.
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    base_url: String,
    api_key: String,
    model: String,
    task_type: TaskType,
    http_client: Client,
}

impl GeminiEmbedding {
    pub fn new(api_key: impl Into<String>) -> Result<Self, EmbeddingError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "API key is empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EmbeddingError::Configuration(e.to_string()))?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            task_type: TaskType::RetrievalDocument,
            http_client,
        })
    }

    /// Read the key from `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self, EmbeddingError> {
        let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| {
            EmbeddingError::Configuration("GOOGLE_API_KEY is not set".to_string())
        })?;
        Self::new(api_key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/{}:embedContent", self.base_url, self.model)
    }

    /// Task type for search text: the query side of a retrieval pair,
    /// otherwise the configured type.
    fn query_task_type(&self) -> TaskType {
        match self.task_type {
            TaskType::RetrievalDocument => TaskType::RetrievalQuery,
            other => other,
        }
    }

    async fn embed_content(
        &self,
        text: &str,
        task_type: TaskType,
    ) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text is empty".to_string()));
        }

        let body = EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: vec![Part { text }],
            },
            task_type,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EmbeddingError::Configuration(format!(
                "API key rejected: {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request(format!("{}: {}", status, detail)));
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        let values = parsed.embedding.values;
        if values.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "embedding has no values".to_string(),
            ));
        }

        debug!(model = %self.model, ?task_type, dimension = values.len(), "embedded text");
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_content(text, self.task_type).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_content(text, self.query_task_type()).await
    }

    fn dimension(&self) -> Option<usize> {
        (self.model == DEFAULT_MODEL).then_some(EMBEDDING_001_DIMENSION)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
