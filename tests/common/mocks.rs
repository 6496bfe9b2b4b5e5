//! Mock implementations for testing.
//!
//! This module provides mock generation backends, embedders and fact stores
//! that can be used across different test files without duplication.

use async_trait::async_trait;
use coinrag::db::{EmbeddedFact, FactStore, SearchFilter, StoreStats};
use coinrag::llm::{GenerationOptions, LLMClient, Prompt};
use coinrag::rag::embeddings::{Embedder, HashEmbedder};
use coinrag::types::{AppError, Fact, Result, RetrievedFact};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock LLM client with a canned response.
///
/// # Examples
///
/// ```ignore
/// // Answer with a fixed string
/// let client = MockLLMClient::new("Bitcoin is priced at $98,000.");
///
/// // Always fail with GenerationUnavailable
/// let client = MockLLMClient::failing();
///
/// // Answer only after a delay (for timeout tests)
/// let client = MockLLMClient::new("late").with_delay(Duration::from_secs(5));
/// ```
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<Prompt>>>,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock client that always returns an error.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new("")
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(&self, prompt: &Prompt, _options: &GenerationOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(AppError::GenerationUnavailable(
                "Mock LLM failure".to_string(),
            ));
        }
        Ok(self.response.clone())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Hash embedder that can be made to fail or stall.
pub struct MockEmbedder {
    inner: HashEmbedder,
    should_fail: bool,
    delay: Option<Duration>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashEmbedder::new(128),
            should_fail: false,
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(AppError::EmbeddingUnavailable(
                "Mock embedder failure".to_string(),
            ));
        }
        Ok(self.inner.embed_text(text))
    }
}

/// Fact store whose every operation fails.
pub struct UnavailableFactStore;

fn unavailable<T>() -> Result<T> {
    Err(AppError::StoreUnavailable(
        "Mock store is down".to_string(),
    ))
}

#[async_trait]
impl FactStore for UnavailableFactStore {
    fn provider_name(&self) -> &'static str {
        "unavailable"
    }

    async fn add(&self, _facts: Vec<EmbeddedFact>) -> Result<usize> {
        unavailable()
    }

    async fn search(
        &self,
        _embedding: &[f32],
        _top_k: usize,
        _filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedFact>> {
        unavailable()
    }

    async fn get(&self, _id: &str) -> Result<Option<Fact>> {
        unavailable()
    }

    async fn delete(&self, _ids: &[String]) -> Result<usize> {
        unavailable()
    }

    async fn clear(&self) -> Result<usize> {
        unavailable()
    }

    async fn count(&self) -> Result<usize> {
        unavailable()
    }

    async fn stats(&self, _coin_key: &str) -> Result<StoreStats> {
        unavailable()
    }
}
