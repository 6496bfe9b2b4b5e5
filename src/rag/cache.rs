//! Embedding cache
//!
//! Wraps any [`Embedder`] with an in-memory LRU cache so repeated queries
//! and re-added facts are not embedded twice.
//!
//! # Cache Key Strategy
//!
//! Cache keys are SHA-256 hashes of `text + "|" + model_name`, so entries
//! from different models never collide.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::embeddings::Embedder;
use crate::types::Result;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Compute a cache key for the given text and model
pub fn compute_key(text: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    hex::encode(hasher.finalize())
}

/// LRU-cached embedder.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedEmbedder {
    /// A capacity of 0 is treated as 1.
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: cache.len(),
            capacity: cache.cap().get(),
        }
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        let hit = self.cache.lock().get(key).cloned();
        match hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = compute_key(text, self.inner.model_name());
        if let Some(embedding) = self.lookup(&key) {
            return Ok(embedding);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.lock().put(key, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.inner.model_name().to_string();
        let keys: Vec<String> = texts.iter().map(|t| compute_key(t, &model)).collect();

        let mut results: Vec<Option<Vec<f32>>> = keys.iter().map(|k| self.lookup(k)).collect();

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&to_embed).await?;

            let mut cache = self.cache.lock();
            for (&i, embedding) in missing.iter().zip(fresh) {
                cache.put(keys[i].clone(), embedding.clone());
                results[i] = Some(embedding);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embeddings::HashEmbedder;
    use std::sync::atomic::AtomicUsize;

    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.inner.embed_text(text))
        }
    }

    fn counting() -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            inner: HashEmbedder::new(16),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_compute_key() {
        let a = compute_key("hello", "model-a");
        assert_eq!(a.len(), 64);
        assert_eq!(a, compute_key("hello", "model-a"));
        assert_ne!(a, compute_key("hello", "model-b"));
    }

    #[tokio::test]
    async fn test_cache_hits_skip_inner_embedder() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 8);

        let first = cached.embed("bitcoin price").await.unwrap();
        let second = cached.embed("bitcoin price").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let stats = cached.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert!((stats.hit_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_batch_only_embeds_misses_and_keeps_order() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 8);

        cached.embed("b").await.unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let batch = cached.embed_batch(&texts).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], inner.inner.embed_text("a"));
        assert_eq!(batch[1], inner.inner.embed_text("b"));
        assert_eq!(batch[2], inner.inner.embed_text("c"));
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 1);

        cached.embed("a").await.unwrap();
        cached.embed("b").await.unwrap();
        cached.embed("a").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cached.stats().entry_count, 1);
    }
}
