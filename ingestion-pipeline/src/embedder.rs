use std::time::Duration;

use async_trait::async_trait;
use common::error::AppError;
use futures::{StreamExt, TryStreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Dimensionality of every stored vector.
pub const EMBEDDING_DIM: usize = 768;
/// Per-call deadline against the embedding API.
const EMBED_TIMEOUT_SECS: u64 = 30;
/// In-flight call cap for batch embedding.
const MAX_CONCURRENT_EMBEDS: usize = 5;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const EMBEDDING_MODEL: &str = "text-embedding-004";

/// Capability producing a unit-length 768-dim vector per text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, AppError>;

    /// Embeds a batch with at most five calls in flight. Any single
    /// failure fails the whole batch.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, AppError> {
        if texts.is_empty() {
            return Err(AppError::Embed("no texts provided".into()));
        }
        let mut futures = Vec::with_capacity(texts.len());
        for text in texts {
            futures.push(self.embed(text));
        }
        futures::stream::iter(futures)
            .buffered(MAX_CONCURRENT_EMBEDS)
            .try_collect()
            .await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest<'a> {
    model: &'a str,
    content: EmbeddingContent<'a>,
    task_type: &'a str,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct EmbeddingContent<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f64>,
}

/// Gemini embedding client with a rotating API-key pool.
///
/// Each call picks a key uniformly at random; there is no per-key state.
/// The rotation only spreads rate-limit pressure across keys.
pub struct GeminiEmbedder {
    api_keys: Vec<String>,
    client: reqwest::Client,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(api_keys: Vec<String>) -> Result<Self, AppError> {
        if api_keys.is_empty() {
            return Err(AppError::Validation(
                "at least one embedder API key is required".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            api_keys,
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn pick_key(&self) -> &str {
        if self.api_keys.len() == 1 {
            return &self.api_keys[0];
        }
        let idx = rand::thread_rng().gen_range(0..self.api_keys.len());
        &self.api_keys[idx]
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, AppError> {
        if text.is_empty() {
            return Err(AppError::Embed("text cannot be empty".into()));
        }

        let request = EmbeddingRequest {
            model: EMBEDDING_MODEL,
            content: EmbeddingContent {
                parts: vec![Part { text }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
            output_dimensionality: EMBEDDING_DIM,
        };

        let url = format!(
            "{}/{}:embedContent?key={}",
            self.base_url,
            EMBEDDING_MODEL,
            self.pick_key()
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embed(format!(
                "embedding API returned status {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embed(format!("failed to decode embedding response: {e}")))?;

        let values = parsed.embedding.values;
        if values.is_empty() {
            return Err(AppError::Embed("no embedding returned from API".into()));
        }
        if values.len() != EMBEDDING_DIM {
            return Err(AppError::Embed(format!(
                "expected {EMBEDDING_DIM} dimensions, got {}",
                values.len()
            )));
        }

        debug!(chars = text.len(), "Embedding generated");

        Ok(normalize(values))
    }
}

/// L2-normalises a vector to unit length. Zero vectors (and any vector
/// whose norm is not finite) are returned verbatim.
pub fn normalize(vec: Vec<f64>) -> Vec<f64> {
    if vec.is_empty() {
        return vec;
    }

    let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vec;
    }

    vec.into_iter().map(|v| v / norm).collect()
}
