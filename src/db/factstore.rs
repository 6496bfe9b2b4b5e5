//! Fact Store Abstraction Layer
//!
//! A fact store persists embedded facts and answers nearest-neighbour
//! queries over their embeddings. The pipeline talks to it only through the
//! [`FactStore`] trait, so backends are interchangeable.
//!
//! # Score Convention
//!
//! Every backend reports [`RetrievedFact::score`] as cosine similarity
//! between the query vector and the fact vector: higher is closer, range
//! `[-1, 1]`. Results are ordered best first. Facts with equal scores keep
//! the order in which they were first added to the store.
//!
//! # Filtering
//!
//! A [`SearchFilter`] restricts a search to facts whose metadata value for a
//! key equals the wanted value, compared trimmed and case-insensitively.
//! The filter applies before ranking: `top_k` counts matching facts only.
//!
//! # Dimensions
//!
//! A store holds vectors of one length. A query or fact embedding of another
//! length means the embedding model does not match the stored facts, which
//! every backend reports as [`AppError::Configuration`].
//!
//! # Replace-by-id
//!
//! Adding a fact whose id is already stored replaces the stored content,
//! metadata and embedding. The store never holds two facts with the same id.

use crate::types::{AppError, Fact, MetadataValue, RetrievedFact, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ============================================================================
// Types
// ============================================================================

/// A fact together with the embedding of its content.
#[derive(Debug, Clone)]
pub struct EmbeddedFact {
    pub fact: Fact,
    pub embedding: Vec<f32>,
}

/// Comparison form of a metadata value: trimmed, lower-case text.
pub fn normalize_metadata(value: &MetadataValue) -> String {
    value.to_string().trim().to_lowercase()
}

/// Restricts a search to facts whose `key` metadata equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub key: String,
    /// Already normalized
    pub value: String,
}

impl SearchFilter {
    pub fn new(key: impl Into<String>, value: &str) -> Self {
        Self {
            key: key.into(),
            value: value.trim().to_lowercase(),
        }
    }

    pub fn matches(&self, fact: &Fact) -> bool {
        fact.metadata
            .get(&self.key)
            .is_some_and(|v| normalize_metadata(v) == self.value)
    }
}

/// Error unless a vector of `actual` length fits a store of `expected`.
pub fn check_dimensions(expected: usize, actual: usize, what: &str) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(AppError::Configuration(format!(
        "{} has {} dimensions but the store holds {}-dimensional vectors; \
         the embedding model does not match the stored facts",
        what, actual, expected
    )))
}

/// Aggregate counts over the stored facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_facts: usize,
    /// Distinct (case-insensitive) values of the coin metadata key
    pub unique_coins: usize,
    /// Histogram of the `fact_type` metadata value
    pub fact_types: BTreeMap<String, usize>,
}

impl StoreStats {
    /// Compute stats over an iterator of facts.
    pub fn from_facts<'a>(facts: impl IntoIterator<Item = &'a Fact>, coin_key: &str) -> Self {
        let mut total_facts = 0;
        let mut coins = BTreeSet::new();
        let mut fact_types = BTreeMap::new();

        for fact in facts {
            total_facts += 1;
            if let Some(coin) = fact.metadata.get(coin_key) {
                coins.insert(normalize_metadata(coin));
            }
            if let Some(kind) = fact.metadata_str("fact_type") {
                *fact_types.entry(kind.to_string()).or_insert(0) += 1;
            }
        }

        Self {
            total_facts,
            unique_coins: coins.len(),
            fact_types,
        }
    }
}

// ============================================================================
// Fact Store Trait
// ============================================================================

/// Storage and similarity search over embedded facts.
///
/// Implementations provide their own synchronization; concurrent reads must
/// not block each other.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Get the name of this store provider.
    fn provider_name(&self) -> &'static str;

    /// Add facts, replacing any stored fact with the same id.
    ///
    /// # Returns
    ///
    /// Number of facts written.
    async fn add(&self, facts: Vec<EmbeddedFact>) -> Result<usize>;

    /// Return up to `top_k` facts nearest to `embedding`, best first.
    ///
    /// With a `filter`, only matching facts are considered.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedFact>>;

    /// Look up a fact by id.
    async fn get(&self, id: &str) -> Result<Option<Fact>>;

    /// Delete facts by id, returning how many existed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Remove every fact, returning how many were removed.
    async fn clear(&self) -> Result<usize>;

    /// Number of stored facts.
    async fn count(&self) -> Result<usize>;

    /// Aggregate statistics; `coin_key` names the coin metadata key.
    async fn stats(&self, coin_key: &str) -> Result<StoreStats>;
}

/// Calculate cosine similarity between two vectors.
///
/// Mismatched lengths and zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// In-Memory Fact Store
// ============================================================================

/// Process-local fact store.
///
/// Facts live in an insertion-ordered map, so a stable sort on score keeps
/// ties in insertion order. Data is lost when the process exits.
pub struct InMemoryFactStore {
    inner: Arc<RwLock<InMemoryFacts>>,
}

#[derive(Default)]
struct InMemoryFacts {
    /// Fixed by the first add, reset by clear
    dimensions: Option<usize>,
    facts: IndexMap<String, EmbeddedFact>,
}

impl InMemoryFactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(InMemoryFacts::default())),
        }
    }
}

impl Default for InMemoryFactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, facts: Vec<EmbeddedFact>) -> Result<usize> {
        let mut inner = self.inner.write();

        let expected = inner
            .dimensions
            .or_else(|| facts.first().map(|f| f.embedding.len()));
        if let Some(expected) = expected {
            for f in &facts {
                check_dimensions(
                    expected,
                    f.embedding.len(),
                    &format!("Embedding for fact '{}'", f.fact.id),
                )?;
            }
        }

        let count = facts.len();
        if count > 0 {
            inner.dimensions = expected;
        }
        for fact in facts {
            // IndexMap::insert keeps the original slot for an existing key
            inner.facts.insert(fact.fact.id.clone(), fact);
        }

        Ok(count)
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedFact>> {
        let inner = self.inner.read();

        if let Some(dimensions) = inner.dimensions {
            check_dimensions(dimensions, embedding.len(), "Query embedding")?;
        }

        let mut scored: Vec<(f32, &EmbeddedFact)> = inner
            .facts
            .values()
            .filter(|f| filter.map_or(true, |filter| filter.matches(&f.fact)))
            .map(|f| (cosine_similarity(embedding, &f.embedding), f))
            .collect();

        // sort_by is stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, f)| RetrievedFact {
                fact: f.fact.clone(),
                score,
            })
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Fact>> {
        Ok(self.inner.read().facts.get(id).map(|f| f.fact.clone()))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut inner = self.inner.write();
        let removed = ids
            .iter()
            .filter(|id| inner.facts.shift_remove(id.as_str()).is_some())
            .count();
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize> {
        let mut inner = self.inner.write();
        let removed = inner.facts.len();
        inner.facts.clear();
        inner.dimensions = None;
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().facts.len())
    }

    async fn stats(&self, coin_key: &str) -> Result<StoreStats> {
        let inner = self.inner.read();
        Ok(StoreStats::from_facts(
            inner.facts.values().map(|f| &f.fact),
            coin_key,
        ))
    }
}
