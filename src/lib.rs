//! # coinrag - Crypto Knowledge RAG Server
//!
//! Answers natural-language questions about cryptocurrencies from a store of
//! short, atomic facts. A question is embedded, the closest facts are
//! retrieved, an LLM answers from those facts, and a rule-based pass flags
//! figures or coins in the answer that the facts do not support.
//!
//! ## Overview
//!
//! coinrag can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `coinrag-server` binary
//! 2. **As a library** - Build the pipeline from a [`CoinragConfig`]
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use coinrag::{AppState, CoinragConfig};
//! use coinrag::types::Fact;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CoinragConfig::load("coinrag.toml")?;
//!     let state = AppState::from_config(config).await?;
//!
//!     state.facts.add(vec![
//!         Fact::new("btc1", "Bitcoin is priced at $98,000").with_metadata("coin", "bitcoin"),
//!     ]).await?;
//!
//!     let result = state.generator.generate("What is the price of Bitcoin?", true, Some(1)).await?;
//!     println!("{} {:?}", result.answer, result.consistency_flags);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `qdrant` | Qdrant fact store |
//! | `local-embeddings` | fastembed ONNX embedding models |
//! | `swagger-ui` | Interactive API docs at `/swagger-ui/` |
//!
//! ## Modules
//!
//! - [`api`] - REST API handlers and routes
//! - [`db`] - Fact store abstraction (in-memory, Qdrant)
//! - [`llm`] - Generation backends
//! - [`rag`] - Embeddings, retrieval, generation and consistency checks
//! - [`types`] - Common types and error handling
//! - [`utils`] - Configuration and timeouts
//!
//! ## Conventions
//!
//! - Retrieval scores are cosine similarities: higher is better. Facts with
//!   equal scores keep the order in which they were first added.
//! - Every call to an embedder, fact store or LLM runs under a timeout from
//!   the configuration.
//! - Configuration is loaded once and passed explicitly; nothing reads
//!   settings from the environment after startup.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface and terminal output.
pub mod cli;
/// Fact stores (in-memory, Qdrant).
pub mod db;
/// Generation backend clients.
pub mod llm;
/// Retrieval Augmented Generation (RAG) pipeline.
pub mod rag;
/// Core types (facts, answers, requests, responses, errors).
pub mod types;
/// Configuration and timeout utilities.
pub mod utils;

// Re-export commonly used types
pub use db::FactStore;
pub use llm::{LLMClient, Provider};
pub use rag::embeddings::Embedder;
pub use rag::facts::FactService;
pub use rag::generator::AnswerGenerator;
pub use rag::retriever::Retriever;
pub use types::{AnswerResult, AppError, Result};
pub use utils::toml_config::CoinragConfig;

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration, loaded once at startup
    pub config: Arc<CoinragConfig>,
    /// Retrieval, generation and consistency checks
    pub generator: AnswerGenerator,
    /// Fact ingestion and maintenance
    pub facts: FactService,
    /// Embedding backend (cached when configured)
    pub embedder: Arc<dyn Embedder>,
    /// Generation backend
    pub llm: Arc<dyn LLMClient>,
}

impl AppState {
    /// Wire the pipeline from already-built components.
    pub fn new(
        config: Arc<CoinragConfig>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn FactStore>,
        llm: Arc<dyn LLMClient>,
    ) -> Result<Self> {
        let retriever = Retriever::new(config.clone(), embedder.clone(), store.clone());
        let generator = AnswerGenerator::new(config.clone(), retriever, llm.clone())?;
        let facts = FactService::new(config.clone(), embedder.clone(), store);

        Ok(Self {
            config,
            generator,
            facts,
            embedder,
            llm,
        })
    }

    /// Build every component named by `config`.
    pub async fn from_config(config: CoinragConfig) -> Result<Self> {
        let store = db::create_store(&config).await?;
        let embedder = rag::embeddings::create_embedder(&config)?;
        let llm = llm::create_client(&config)?;
        Self::new(Arc::new(config), embedder, store, llm)
    }

    pub fn retriever(&self) -> &Retriever {
        self.generator.retriever()
    }
}
