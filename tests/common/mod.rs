//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod mocks;

use coinrag::db::{FactStore, InMemoryFactStore};
use coinrag::rag::embeddings::Embedder;
use coinrag::types::Fact;
use coinrag::utils::toml_config::{CoinragConfig, GenerationProviderConfig};
use coinrag::{AppState, LLMClient};
use mocks::{MockEmbedder, MockLLMClient};
use std::sync::Arc;

/// Default configuration with short timeouts and no external providers.
pub fn test_config() -> CoinragConfig {
    let mut config = CoinragConfig::default();
    config.generation.provider = GenerationProviderConfig::Ollama {
        base_url: "http://127.0.0.1:9".to_string(),
    };
    config.generation.timeout_secs = 1;
    config.embedding.timeout_secs = 1;
    config.store.timeout_secs = 1;
    config
}

/// State with a mock embedder, an in-memory store and the given LLM.
pub fn state_with(config: CoinragConfig, llm: MockLLMClient) -> AppState {
    state_with_parts(
        config,
        Arc::new(MockEmbedder::new()),
        Arc::new(InMemoryFactStore::new()),
        llm,
    )
}

pub fn state_with_parts(
    config: CoinragConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn FactStore>,
    llm: MockLLMClient,
) -> AppState {
    let llm: Arc<dyn LLMClient> = Arc::new(llm);
    AppState::new(Arc::new(config), embedder, store, llm).expect("valid test state")
}

pub fn btc_fact() -> Fact {
    Fact::new("btc1", "Bitcoin is priced at $98,000").with_metadata("coin", "bitcoin")
}

pub fn sample_facts() -> Vec<Fact> {
    vec![
        btc_fact(),
        Fact::new("eth1", "Ethereum completed the merge to proof of stake")
            .with_metadata("coin", "ethereum")
            .with_metadata("fact_type", "event"),
        Fact::new("sol1", "Solana processes thousands of transactions per second")
            .with_metadata("coin", "solana")
            .with_metadata("fact_type", "technical"),
    ]
}
