use std::sync::Arc;

use indexmap::IndexMap;

use crate::db::{EmbeddedFact, FactStore, StoreStats};
use crate::rag::embeddings::Embedder;
use crate::types::{AppError, Dependency, Fact, Result};
use crate::utils::timeout::bounded;
use crate::utils::toml_config::CoinragConfig;

/// Ingestion and maintenance of the fact collection.
///
/// Adding a fact whose id already exists replaces it, so re-adding the same
/// batch leaves the store unchanged.
#[derive(Clone)]
pub struct FactService {
    config: Arc<CoinragConfig>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn FactStore>,
}

impl FactService {
    pub fn new(
        config: Arc<CoinragConfig>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn FactStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    /// Validate, embed and upsert `facts`; returns how many distinct ids were written.
    ///
    /// The whole batch is rejected if any fact is invalid. Within a batch the
    /// last fact with a given id wins.
    pub async fn add(&self, facts: Vec<Fact>) -> Result<usize> {
        if facts.is_empty() {
            return Ok(0);
        }
        let limit = self.config.rag.max_facts_per_request;
        if facts.len() > limit {
            return Err(AppError::InvalidArgument(format!(
                "at most {} facts may be added per request, got {}",
                limit,
                facts.len()
            )));
        }
        for fact in &facts {
            fact.validate()?;
        }

        let mut unique: IndexMap<String, Fact> = IndexMap::with_capacity(facts.len());
        for fact in facts {
            unique.insert(fact.id.clone(), fact);
        }
        let facts: Vec<Fact> = unique.into_values().collect();

        let texts: Vec<String> = facts.iter().map(|f| f.content.clone()).collect();
        let embeddings = bounded(
            Dependency::Embedding,
            self.config.embedding.timeout(),
            self.embedder.embed_batch(&texts),
        )
        .await?;

        if embeddings.len() != facts.len() {
            return Err(AppError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                facts.len(),
                embeddings.len()
            )));
        }

        let embedded = facts
            .into_iter()
            .zip(embeddings)
            .map(|(fact, embedding)| EmbeddedFact { fact, embedding })
            .collect();

        let added = bounded(
            Dependency::Store,
            self.config.store.timeout(),
            self.store.add(embedded),
        )
        .await?;

        tracing::info!(added, "Facts added");
        Ok(added)
    }

    pub async fn get(&self, id: &str) -> Result<Fact> {
        bounded(
            Dependency::Store,
            self.config.store.timeout(),
            self.store.get(id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("fact '{}' not found", id)))
    }

    /// Remove the given ids; unknown ids are ignored.
    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        let removed = bounded(
            Dependency::Store,
            self.config.store.timeout(),
            self.store.delete(ids),
        )
        .await?;
        tracing::info!(removed, "Facts deleted");
        Ok(removed)
    }

    /// Remove every fact; returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let removed = bounded(
            Dependency::Store,
            self.config.store.timeout(),
            self.store.clear(),
        )
        .await?;
        tracing::warn!(removed, "Fact store cleared");
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize> {
        bounded(
            Dependency::Store,
            self.config.store.timeout(),
            self.store.count(),
        )
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        bounded(
            Dependency::Store,
            self.config.store.timeout(),
            self.store.stats(&self.config.rag.coin_metadata_key),
        )
        .await
    }
}
