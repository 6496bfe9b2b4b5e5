use std::sync::Arc;

use crate::db::{FactStore, SearchFilter};
use crate::rag::embeddings::Embedder;
use crate::types::{AppError, Dependency, Result, RetrievedFact};
use crate::utils::timeout::bounded;
use crate::utils::toml_config::CoinragConfig;

/// Embeds a query and asks the fact store for its nearest facts.
///
/// Results come back ordered by descending score (cosine similarity), ties
/// in insertion order. Both external calls run under their configured
/// timeouts.
#[derive(Clone)]
pub struct Retriever {
    config: Arc<CoinragConfig>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn FactStore>,
}

impl Retriever {
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

    pub fn default_top_k(&self) -> usize {
        self.config.rag.default_top_k
    }

    /// Up to `top_k` facts most similar to `query`.
    ///
    /// `top_k` above `rag.max_top_k` is clamped. An empty store yields an
    /// empty list.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedFact>> {
        self.retrieve_filtered(query, top_k, None).await
    }

    /// Like [`Retriever::retrieve`], restricted to facts about `coin`.
    ///
    /// The coin is matched against the `rag.coin_metadata_key` metadata value,
    /// trimmed and case-insensitive. `top_k` counts matching facts only.
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        top_k: usize,
        coin: Option<&str>,
    ) -> Result<Vec<RetrievedFact>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidArgument("query cannot be empty".to_string()));
        }
        if top_k == 0 {
            return Err(AppError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        let filter = match coin {
            Some(coin) if coin.trim().is_empty() => {
                return Err(AppError::InvalidArgument(
                    "coin filter cannot be empty".to_string(),
                ))
            }
            Some(coin) => Some(SearchFilter::new(&self.config.rag.coin_metadata_key, coin)),
            None => None,
        };
        let top_k = top_k.min(self.config.rag.max_top_k);

        let embedding = bounded(
            Dependency::Embedding,
            self.config.embedding.timeout(),
            self.embedder.embed(query),
        )
        .await?;

        let facts = bounded(
            Dependency::Store,
            self.config.store.timeout(),
            self.store.search(&embedding, top_k, filter.as_ref()),
        )
        .await?;

        tracing::debug!(
            top_k,
            coin = filter.as_ref().map(|f| f.value.as_str()),
            returned = facts.len(),
            best_score = facts.first().map(|f| f.score),
            "Retrieved facts"
        );

        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EmbeddedFact, InMemoryFactStore};
    use crate::rag::embeddings::HashEmbedder;
    use crate::types::Fact;

    async fn seeded() -> Retriever {
        let embedder = Arc::new(HashEmbedder::new(128));
        let store = Arc::new(InMemoryFactStore::new());

        let facts = [
            Fact::new("btc1", "Bitcoin is priced at $98,000").with_metadata("coin", "bitcoin"),
            Fact::new("eth1", "Ethereum validators earn staking rewards")
                .with_metadata("coin", "Ethereum"),
            Fact::new("sol1", "Solana processes thousands of transactions per second")
                .with_metadata("coin", "solana"),
        ];
        let embedded = facts
            .into_iter()
            .map(|fact| EmbeddedFact {
                embedding: embedder.embed_text(&fact.content),
                fact,
            })
            .collect();
        store.add(embedded).await.unwrap();

        Retriever::new(Arc::new(CoinragConfig::default()), embedder, store)
    }

    #[tokio::test]
    async fn test_retrieve_ranks_best_match_first() {
        let retriever = seeded().await;
        let facts = retriever.retrieve("What is the bitcoin price?", 2).await.unwrap();

        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].fact.id, "btc1");
        assert!(facts[0].score >= facts[1].score);
    }

    #[tokio::test]
    async fn test_retrieve_returns_at_most_store_size() {
        let retriever = seeded().await;
        let facts = retriever.retrieve("crypto", 10).await.unwrap();
        assert_eq!(facts.len(), 3);
    }

    #[tokio::test]
    async fn test_retrieve_rejects_bad_arguments() {
        let retriever = seeded().await;
        assert!(matches!(
            retriever.retrieve("bitcoin", 0).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            retriever.retrieve("   ", 3).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_retrieve_filtered_by_coin() {
        let retriever = seeded().await;

        let facts = retriever
            .retrieve_filtered("What is the bitcoin price?", 3, Some("ethereum"))
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact.id, "eth1");

        assert!(retriever
            .retrieve_filtered("bitcoin", 3, Some("dogecoin"))
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            retriever.retrieve_filtered("bitcoin", 3, Some("  ")).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_retrieve_from_empty_store() {
        let retriever = Retriever::new(
            Arc::new(CoinragConfig::default()),
            Arc::new(HashEmbedder::new(64)),
            Arc::new(InMemoryFactStore::new()),
        );
        assert!(retriever.retrieve("bitcoin", 5).await.unwrap().is_empty());
    }
}
