use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============= Fact Types =============

/// A scalar metadata value attached to a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Numeric view of the value; strings are not coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Fact metadata, ordered by key so serialization is stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// An atomic stored statement, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Fact {
    pub id: String,
    pub content: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

impl Fact {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Rejects facts that could never be retrieved meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::InvalidArgument("fact id cannot be empty".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "fact '{}' has empty content",
                self.id
            )));
        }
        Ok(())
    }

    /// String value of a metadata key, if present and textual.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_str)
    }
}

/// A fact paired with its similarity to the query.
///
/// `score` is the cosine similarity between the query embedding and the
/// fact embedding: higher is closer, range `[-1, 1]`. Every fact store
/// reports scores with this convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RetrievedFact {
    #[serde(flatten)]
    pub fact: Fact,
    pub score: f32,
}

// ============= Answer Types =============

/// Advisory annotations attached to a generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyFlag {
    /// A figure in the answer matches no figure in the retrieved facts.
    UnsupportedNumber,
    /// A coin named in the answer is absent from every retrieved fact.
    UngroundedEntity,
    /// The answer uses forward-looking or vaguely sourced phrasing.
    SpeculativeClaim,
    /// Retrieval failed and the answer was generated without context.
    RetrievalDegraded,
}

impl ConsistencyFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyFlag::UnsupportedNumber => "UNSUPPORTED_NUMBER",
            ConsistencyFlag::UngroundedEntity => "UNGROUNDED_ENTITY",
            ConsistencyFlag::SpeculativeClaim => "SPECULATIVE_CLAIM",
            ConsistencyFlag::RetrievalDegraded => "RETRIEVAL_DEGRADED",
        }
    }
}

impl fmt::Display for ConsistencyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pass through the answer pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerResult {
    pub answer: String,
    pub facts_used: usize,
    /// Wall-clock duration of the generation backend call, in seconds.
    pub generation_time: f64,
    /// Wall-clock duration of embedding plus store search, in seconds.
    /// Zero when no retrieval ran.
    #[serde(default)]
    pub retrieval_time: f64,
    pub retrieved_facts: Vec<RetrievedFact>,
    pub consistency_flags: BTreeSet<ConsistencyFlag>,
    pub model: String,
    pub confidence: f32,
    pub context_truncated: bool,
    pub degraded: bool,
}

// ============= API Request/Response Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<i64>,
    /// Only consider facts whose coin metadata matches, case-insensitively.
    #[serde(default)]
    pub coin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RetrieveResponse {
    pub status: String,
    pub facts: Vec<RetrievedFact>,
    pub count: usize,
    /// Seconds spent embedding the query and searching the store.
    pub retrieval_time: f64,
    pub timestamp: DateTime<Utc>,
}

fn default_use_rag() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub query: String,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub coin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerateResponse {
    pub status: String,
    #[serde(flatten)]
    pub result: AnswerResult,
    pub timestamp: DateTime<Utc>,
}

/// The same question answered with and without retrieved context.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerComparison {
    pub rag: AnswerResult,
    pub no_rag: AnswerResult,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CompareRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub coin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CompareResponse {
    pub status: String,
    pub query: String,
    #[serde(flatten)]
    pub comparison: AnswerComparison,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddFactsRequest {
    pub facts: Vec<Fact>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddFactsResponse {
    pub status: String,
    pub added: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearFactsResponse {
    pub status: String,
    pub message: String,
    pub removed: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFactResponse {
    pub status: String,
    pub id: String,
    pub removed: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub status: String,
    pub total_facts: usize,
    pub unique_coins: usize,
    pub fact_types: BTreeMap<String, usize>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub embedding_model: String,
    pub generation_provider: String,
    pub generation_model: String,
    pub store_provider: String,
    pub total_facts: usize,
    pub timestamp: DateTime<Utc>,
}

// ============= Error Types =============

/// External collaborator whose call exceeded its time bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    Embedding,
    Store,
    Generation,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dependency::Embedding => "embedding",
            Dependency::Store => "fact store",
            Dependency::Generation => "generation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Fact store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{dependency} call timed out after {after:?}")]
    Timeout { dependency: Dependency, after: Duration },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Seconds a client should wait before retrying a failed dependency.
const RETRY_AFTER_SECS: u64 = 5;

impl AppError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::NotFound(_) => "not_found",
            AppError::EmbeddingUnavailable(_) => "embedding_unavailable",
            AppError::GenerationUnavailable(_) => "generation_unavailable",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Timeout { .. } => "timeout",
            AppError::Configuration(_) => "configuration",
            AppError::Internal(_) => "internal",
        }
    }

    /// True for failures of an external collaborator, including timeouts.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            AppError::EmbeddingUnavailable(_)
                | AppError::GenerationUnavailable(_)
                | AppError::StoreUnavailable(_)
                | AppError::Timeout { .. }
        )
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::EmbeddingUnavailable(_)
            | AppError::GenerationUnavailable(_)
            | AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        if self.is_dependency_failure() {
            (
                status,
                [(axum::http::header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                axum::Json(body),
            )
                .into_response()
        } else {
            (status, axum::Json(body)).into_response()
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
