//! Fact stores.
//!
//! This module provides the [`FactStore`] abstraction and its backends:
//! - `memory` (default) - Process-local, insertion-ordered store
//! - `qdrant` - Qdrant vector search engine (requires the `qdrant` feature)
//!
//! Enable providers via Cargo features:
//! ```toml
//! coinrag-server = { version = "*", features = ["qdrant"] }
//! ```

#![allow(missing_docs)]

// Fact store abstraction layer
pub mod factstore;

// Provider implementations
#[cfg(feature = "qdrant")]
pub mod qdrant;

// Re-exports
pub use factstore::{
    check_dimensions, cosine_similarity, normalize_metadata, EmbeddedFact, FactStore,
    InMemoryFactStore, SearchFilter, StoreStats,
};

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantFactStore;

use crate::types::{AppError, Result};
use crate::utils::toml_config::{CoinragConfig, StoreProviderConfig};
use std::sync::Arc;

/// Build the fact store named by the configuration.
pub async fn create_store(config: &CoinragConfig) -> Result<Arc<dyn FactStore>> {
    match &config.store.provider {
        StoreProviderConfig::Memory => Ok(Arc::new(InMemoryFactStore::new())),

        #[cfg(feature = "qdrant")]
        StoreProviderConfig::Qdrant { url, api_key_env } => {
            let api_key = match api_key_env {
                Some(env) => Some(
                    config
                        .resolve_env(env)
                        .map_err(|e| AppError::Configuration(e.to_string()))?,
                ),
                None => None,
            };
            let store = QdrantFactStore::new(url, api_key, &config.store.collection).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "qdrant"))]
        StoreProviderConfig::Qdrant { .. } => Err(AppError::Configuration(
            "Qdrant fact store requires the 'qdrant' feature".to_string(),
        )),
    }
}
