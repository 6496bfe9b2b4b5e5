//! Embedding functions.
//!
//! An [`Embedder`] maps text to a fixed-length vector. Every embedder used by
//! one store must produce vectors of the same length; the stores reject
//! mismatches.
//!
//! Available backends:
//! - [`OpenAIEmbedder`] - any OpenAI-compatible `/embeddings` endpoint
//! - [`OllamaEmbedder`] - Ollama `/api/embed`
//! - [`HashEmbedder`] - deterministic token hashing, no network; lexical only
//! - `FastEmbedder` - local ONNX models (`local-embeddings` feature)

use crate::types::{AppError, Result};
use crate::utils::toml_config::{CoinragConfig, EmbeddingProviderConfig};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::cache::CachedEmbedder;

/// Text to vector mapping.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, part of the embedding cache key.
    fn model_name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts concurrently, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        try_join_all(texts.iter().map(|text| self.embed(text))).await
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

fn unavailable(provider: &str, e: impl std::fmt::Display) -> AppError {
    AppError::EmbeddingUnavailable(format!("{}: {}", provider, e))
}

// ============================================================================
// OpenAI-compatible embeddings
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings from an OpenAI-compatible API.
pub struct OpenAIEmbedder {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, api_base: String, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| unavailable("openai", "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&OpenAIEmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| unavailable("openai", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(
                "openai",
                format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let mut parsed: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| unavailable("openai", format!("invalid response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(unavailable(
                "openai",
                format!("expected {} embeddings, got {}", texts.len(), parsed.data.len()),
            ));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ============================================================================
// Ollama embeddings
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from a local Ollama server.
pub struct OllamaEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| unavailable("ollama", "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| unavailable("ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable("ollama", format!("HTTP {}: {}", status, body)));
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| unavailable("ollama", format!("invalid response: {}", e)))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(unavailable(
                "ollama",
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            ));
        }

        Ok(parsed.embeddings)
    }
}

// ============================================================================
// Hash embeddings
// ============================================================================

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it", "of",
    "on", "or", "that", "the", "this", "to", "was", "what", "when", "which", "who", "will", "with",
];

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token (stopwords removed, trailing `s`/`d`
/// stripped from longer words) is hashed with SHA-256 into one signed
/// bucket; the vector is L2-normalised. Texts sharing words get positive
/// cosine similarity. Needs no model or network, which makes it the
/// offline default.
pub struct HashEmbedder {
    dimensions: usize,
    name: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            name: format!("hash-{}", dimensions.max(1)),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn normalize_token(token: &str) -> Option<String> {
        let token = token.to_lowercase();
        if token.is_empty() || STOPWORDS.contains(&token.as_str()) {
            return None;
        }
        let stem = if token.len() > 4 && !token.chars().all(|c| c.is_ascii_digit()) {
            token.trim_end_matches(['s', 'd']).to_string()
        } else {
            token
        };
        Some(stem)
    }

    /// Embed synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter_map(Self::normalize_token)
        {
            let hash = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&hash[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if hash[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

// ============================================================================
// Local fastembed models
// ============================================================================

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use parking_lot::Mutex;

    /// Local ONNX embedding model via fastembed.
    pub struct FastEmbedder {
        model: Arc<Mutex<TextEmbedding>>,
        name: String,
    }

    impl FastEmbedder {
        pub fn new(model_name: &str) -> Result<Self> {
            let model = match model_name {
                "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                    EmbeddingModel::AllMiniLML6V2
                }
                "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
                "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
                other => {
                    return Err(AppError::Configuration(format!(
                        "Unsupported fastembed model '{}'",
                        other
                    )))
                }
            };

            let embedding = TextEmbedding::try_new(
                InitOptions::new(model).with_show_download_progress(false),
            )
            .map_err(|e| unavailable("fastembed", e))?;

            Ok(Self {
                model: Arc::new(Mutex::new(embedding)),
                name: model_name.to_string(),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedder {
        fn model_name(&self) -> &str {
            &self.name
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_batch(&[text.to_string()])
                .await?
                .pop()
                .ok_or_else(|| unavailable("fastembed", "no embedding returned"))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || model.lock().embed(texts, None))
                .await
                .map_err(|e| AppError::Internal(format!("Embedding task failed: {}", e)))?
                .map_err(|e| unavailable("fastembed", e))
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the embedder named by the configuration, wrapped in the LRU cache
/// when `embedding.cache_capacity` is non-zero.
pub fn create_embedder(config: &CoinragConfig) -> Result<Arc<dyn Embedder>> {
    let timeout = config.embedding.timeout();

    let embedder: Arc<dyn Embedder> = match &config.embedding.provider {
        EmbeddingProviderConfig::OpenAI {
            api_key_env,
            api_base,
            model,
        } => {
            let api_key = config
                .resolve_env(api_key_env)
                .map_err(|e| AppError::Configuration(e.to_string()))?;
            Arc::new(OpenAIEmbedder::new(
                api_key,
                api_base.clone(),
                model.clone(),
                timeout,
            )?)
        }
        EmbeddingProviderConfig::Ollama { base_url, model } => Arc::new(OllamaEmbedder::new(
            base_url.clone(),
            model.clone(),
            timeout,
        )?),
        EmbeddingProviderConfig::Hash { dimensions } => Arc::new(HashEmbedder::new(*dimensions)),

        #[cfg(feature = "local-embeddings")]
        EmbeddingProviderConfig::Fastembed { model } => Arc::new(FastEmbedder::new(model)?),

        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingProviderConfig::Fastembed { .. } => {
            return Err(AppError::Configuration(
                "fastembed embeddings require the 'local-embeddings' feature".to_string(),
            ))
        }
    };

    tracing::info!(
        model = embedder.model_name(),
        cache_capacity = config.embedding.cache_capacity,
        "Embedding provider ready"
    );

    if config.embedding.cache_capacity == 0 {
        return Ok(embedder);
    }
    Ok(Arc::new(CachedEmbedder::new(
        embedder,
        config.embedding.cache_capacity,
    )))
}
