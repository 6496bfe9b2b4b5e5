//! TOML-based configuration for coinrag
//!
//! The whole service is configured from one TOML file (`coinrag.toml`). The
//! file is parsed and validated once at startup and the resulting
//! [`CoinragConfig`] is passed explicitly to every component that needs it;
//! nothing in the pipeline reads configuration from the environment on its
//! own.
//!
//! Secrets never live in the file. Fields ending in `_env` name the
//! environment variable holding the secret; validation checks that each
//! referenced variable is set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure loaded from coinrag.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoinragConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub consistency: ConsistencyConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Maximum accepted request body size
    #[serde(default = "default_body_limit")]
    pub request_body_limit_bytes: usize,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            request_body_limit_bytes: default_body_limit(),
            cors_origins: Vec::new(),
        }
    }
}

// ============= Embedding Configuration =============

/// Embedding provider, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmbeddingProviderConfig {
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAI {
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        #[serde(default = "default_openai_embedding_model")]
        model: String,
    },
    /// Ollama `/api/embed`
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_embedding_model")]
        model: String,
    },
    /// Deterministic token hashing, no network
    Hash {
        #[serde(default = "default_hash_dimensions")]
        dimensions: usize,
    },
    /// Local ONNX model through fastembed (`local-embeddings` feature)
    Fastembed {
        #[serde(default = "default_fastembed_model")]
        model: String,
    },
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_hash_dimensions() -> usize {
    384
}

fn default_fastembed_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        EmbeddingProviderConfig::Hash {
            dimensions: default_hash_dimensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderConfig,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Number of embeddings kept in the LRU cache; 0 disables caching
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_embedding_timeout() -> u64 {
    10
}

fn default_cache_capacity() -> usize {
    1024
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderConfig::default(),
            timeout_secs: default_embedding_timeout(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============= Generation Configuration =============

/// Generation backend, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationProviderConfig {
    /// Any OpenAI-compatible chat completions API (OpenAI, Groq, OpenRouter)
    OpenAI {
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
    },
    /// Ollama `/api/chat`
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl Default for GenerationProviderConfig {
    fn default() -> Self {
        GenerationProviderConfig::OpenAI {
            api_key_env: "GROQ_API_KEY".to_string(),
            api_base: "https://api.groq.com/openai/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationProviderConfig,

    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Lower values favour deterministic, fact-grounded phrasing
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    500
}

fn default_generation_timeout() -> u64 {
    30
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProviderConfig::default(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============= Fact Store Configuration =============

/// Fact store backend, tagged by `type`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreProviderConfig {
    /// Process-local, insertion-ordered store
    #[default]
    Memory,
    /// Qdrant server (`qdrant` feature)
    Qdrant {
        #[serde(default = "default_qdrant_url")]
        url: String,
        #[serde(default)]
        api_key_env: Option<String>,
    },
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub provider: StoreProviderConfig,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_collection() -> String {
    "crypto_facts".to_string()
}

fn default_store_timeout() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreProviderConfig::default(),
            collection: default_collection(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============= RAG Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Upper bound on `top_k`; library callers are clamped, HTTP callers rejected
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Maximum characters of serialized fact context placed in a prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Answer without context (flagged) when retrieval fails instead of erroring
    #[serde(default)]
    pub fallback_on_retrieval_failure: bool,

    /// Metadata key naming the coin a fact is about
    #[serde(default = "default_coin_key")]
    pub coin_metadata_key: String,

    /// Confidence assumed for facts without a `confidence` metadata value
    #[serde(default = "default_fact_confidence")]
    pub default_fact_confidence: f32,

    #[serde(default = "default_max_facts_per_request")]
    pub max_facts_per_request: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    50
}

fn default_max_context_chars() -> usize {
    4000
}

fn default_coin_key() -> String {
    "coin".to_string()
}

fn default_fact_confidence() -> f32 {
    0.5
}

fn default_max_facts_per_request() -> usize {
    1000
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            max_context_chars: default_max_context_chars(),
            fallback_on_retrieval_failure: false,
            coin_metadata_key: default_coin_key(),
            default_fact_confidence: default_fact_confidence(),
            max_facts_per_request: default_max_facts_per_request(),
        }
    }
}

// ============= Consistency Check Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Relative difference under which two figures count as the same
    #[serde(default = "default_numeric_tolerance")]
    pub numeric_tolerance: f64,

    /// Bare numbers (no currency, percent or magnitude word) below this are ignored
    #[serde(default = "default_min_checked_value")]
    pub min_checked_value: f64,

    #[serde(default = "default_true")]
    pub flag_speculative_language: bool,

    /// Additional coin names mapped to ticker symbols, e.g. `pepe = "PEPE"`
    #[serde(default)]
    pub extra_entities: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_numeric_tolerance() -> f64 {
    0.01
}

fn default_min_checked_value() -> f64 {
    100.0
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            numeric_tolerance: default_numeric_tolerance(),
            min_checked_value: default_min_checked_value(),
            flag_speculative_language: true,
            extra_entities: BTreeMap::new(),
        }
    }
}

// ============= Validation =============

/// Kinds of non-fatal configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarningKind {
    LexicalEmbeddings,
    FeatureNotCompiled,
    ConsistencyDisabled,
    DegradedFallback,
}

/// A non-fatal configuration observation
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),
}

impl CoinragConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse without validating
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate value ranges and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_ranges()?;

        if let EmbeddingProviderConfig::OpenAI { api_key_env, .. } = &self.embedding.provider {
            self.validate_env_var(api_key_env)?;
        }
        if let GenerationProviderConfig::OpenAI { api_key_env, .. } = &self.generation.provider {
            self.validate_env_var(api_key_env)?;
        }
        if let StoreProviderConfig::Qdrant {
            api_key_env: Some(env),
            ..
        } = &self.store.provider
        {
            self.validate_env_var(env)?;
        }

        Ok(())
    }

    fn validate_ranges(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.embedding.timeout_secs == 0 {
            return fail("embedding.timeout_secs must be greater than 0".into());
        }
        if self.generation.timeout_secs == 0 {
            return fail("generation.timeout_secs must be greater than 0".into());
        }
        if self.store.timeout_secs == 0 {
            return fail("store.timeout_secs must be greater than 0".into());
        }
        if let EmbeddingProviderConfig::Hash { dimensions: 0 } = self.embedding.provider {
            return fail("embedding.provider.dimensions must be greater than 0".into());
        }

        if self.generation.model.trim().is_empty() {
            return fail("generation.model cannot be empty".into());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return fail(format!(
                "generation.temperature must be within [0, 2], got {}",
                self.generation.temperature
            ));
        }
        if self.generation.max_tokens == 0 {
            return fail("generation.max_tokens must be greater than 0".into());
        }

        if self.store.collection.trim().is_empty() {
            return fail("store.collection cannot be empty".into());
        }

        let rag = &self.rag;
        if rag.default_top_k == 0 || rag.max_top_k == 0 {
            return fail("rag.default_top_k and rag.max_top_k must be greater than 0".into());
        }
        if rag.default_top_k > rag.max_top_k {
            return fail(format!(
                "rag.default_top_k ({}) exceeds rag.max_top_k ({})",
                rag.default_top_k, rag.max_top_k
            ));
        }
        if rag.max_context_chars == 0 {
            return fail("rag.max_context_chars must be greater than 0".into());
        }
        if rag.max_facts_per_request == 0 {
            return fail("rag.max_facts_per_request must be greater than 0".into());
        }
        if !(0.0..=1.0).contains(&rag.default_fact_confidence) {
            return fail("rag.default_fact_confidence must be within [0, 1]".into());
        }

        let tolerance = self.consistency.numeric_tolerance;
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return fail(format!(
                "consistency.numeric_tolerance must be within (0, 1), got {}",
                tolerance
            ));
        }
        if self.consistency.min_checked_value < 0.0 {
            return fail("consistency.min_checked_value cannot be negative".into());
        }

        Ok(())
    }

    /// Validate and collect non-fatal warnings
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();

        match &self.embedding.provider {
            EmbeddingProviderConfig::Hash { .. } => warnings.push(ConfigWarning {
                kind: ConfigWarningKind::LexicalEmbeddings,
                message: "Hash embeddings only capture shared words; configure a model-backed \
                          embedding provider for semantic retrieval"
                    .to_string(),
            }),
            EmbeddingProviderConfig::Fastembed { .. } if !cfg!(feature = "local-embeddings") => {
                warnings.push(ConfigWarning {
                    kind: ConfigWarningKind::FeatureNotCompiled,
                    message: "fastembed embeddings require the 'local-embeddings' feature"
                        .to_string(),
                })
            }
            _ => {}
        }

        if matches!(self.store.provider, StoreProviderConfig::Qdrant { .. })
            && !cfg!(feature = "qdrant")
        {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::FeatureNotCompiled,
                message: "Qdrant fact store requires the 'qdrant' feature".to_string(),
            });
        }

        if !self.consistency.enabled {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::ConsistencyDisabled,
                message: "Consistency checks are disabled; answers will carry no flags"
                    .to_string(),
            });
        }

        if self.rag.fallback_on_retrieval_failure {
            warnings.push(ConfigWarning {
                kind: ConfigWarningKind::DegradedFallback,
                message: "Retrieval failures fall back to ungrounded answers (flagged \
                          RETRIEVAL_DEGRADED)"
                    .to_string(),
            });
        }

        Ok(warnings)
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Resolve a secret from the environment variable an `_env` field names
    pub fn resolve_env(&self, env_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_name).map_err(|_| ConfigError::MissingEnvVar(env_name.to_string()))
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
