//! LLM Client abstractions and provider management
//!
//! This module provides a unified interface for the generation backends:
//! - **OpenAI-compatible**: OpenAI, Groq, OpenRouter and anything else that
//!   speaks `/chat/completions`
//! - **Ollama**: local inference through `/api/chat`

use crate::types::{AppError, Result};
use crate::utils::toml_config::{CoinragConfig, GenerationConfig, GenerationProviderConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A prompt: optional system instruction plus the user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Decoding options passed with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Backend model variant
    pub model: String,
    /// Lower values favour deterministic, fact-grounded phrasing
    pub temperature: f32,
    /// Caps response length and cost
    pub max_tokens: u32,
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Generic LLM client trait for provider abstraction
///
/// Implementations map network, authentication and rate-limit failures to
/// [`AppError::GenerationUnavailable`]. Callers bound every call with a
/// timeout; implementations also set an HTTP timeout as a backstop.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion for `prompt`
    async fn complete(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

/// Provider enum for runtime selection, with secrets resolved
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including Groq, OpenRouter and compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "gsk-...".to_string(),
    ///     api_base: "https://api.groq.com/openai/v1".to_string(),
    /// };
    /// ```
    OpenAI { api_key: String, api_base: String },

    /// Ollama local LLM provider
    Ollama { base_url: String },
}

impl Provider {
    /// Resolve the configured provider, reading its API key from the
    /// environment variable the config names
    pub fn from_config(config: &CoinragConfig) -> Result<Self> {
        match &config.generation.provider {
            GenerationProviderConfig::OpenAI {
                api_key_env,
                api_base,
            } => {
                let api_key = config
                    .resolve_env(api_key_env)
                    .map_err(|e| AppError::Configuration(e.to_string()))?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                })
            }
            GenerationProviderConfig::Ollama { base_url } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
            }),
        }
    }

    /// Create a client instance for this provider
    pub fn create_client(&self, timeout: Duration) -> Result<Arc<dyn LLMClient>> {
        match self {
            Provider::OpenAI { api_key, api_base } => Ok(Arc::new(
                super::openai::OpenAIClient::new(api_key.clone(), api_base.clone(), timeout)?,
            )),
            Provider::Ollama { base_url } => Ok(Arc::new(super::ollama::OllamaClient::new(
                base_url.clone(),
                timeout,
            )?)),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }
}

/// Build the configured generation client
pub fn create_client(config: &CoinragConfig) -> Result<Arc<dyn LLMClient>> {
    let provider = Provider::from_config(config)?;
    let client = provider.create_client(config.generation.timeout())?;

    tracing::info!(
        provider = provider.name(),
        model = %config.generation.model,
        "Generation provider ready"
    );
    Ok(client)
}

/// Shared HTTP client construction for the providers
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP status to a generation error
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> AppError {
    let reason = match status.as_u16() {
        401 | 403 => "authentication failed",
        429 => "rate limited",
        500..=599 => "server error",
        _ => "request rejected",
    };
    let snippet: String = body.chars().take(200).collect();
    AppError::GenerationUnavailable(format!(
        "{} {} (HTTP {}): {}",
        provider, reason, status, snippet
    ))
}
