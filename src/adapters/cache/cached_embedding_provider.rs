//! Caching decorator for embedding providers.
//!
//! Embeddings are keyed by a fingerprint of the normalized text, namespaced
//! by model name and dimension so switching models never serves stale
//! vectors. Concurrent requests for the same text share one inner call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::ports::embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
use crate::infrastructure::cache::{text_fingerprint, CacheManager, KeyedLocks};

/// Cached embedding provider decorator.
///
/// Wraps any `EmbeddingProvider` and consults the [`CacheManager`] before
/// delegating. A disabled cache turns this into a pass-through.
pub struct CachedEmbeddingProvider<P: EmbeddingProvider + ?Sized> {
    inner: Arc<P>,
    cache: Arc<CacheManager>,
    namespace: String,
    in_flight: KeyedLocks,
}

impl<P: EmbeddingProvider + ?Sized> CachedEmbeddingProvider<P> {
    pub fn new(inner: Arc<P>, cache: Arc<CacheManager>, model_name: &str) -> Self {
        let namespace = format!("{model_name}-{}", inner.dimension());
        Self {
            inner,
            cache,
            namespace,
            in_flight: KeyedLocks::new(),
        }
    }

    pub fn inner(&self) -> &Arc<P> {
        &self.inner
    }

    /// Cache namespace, `<model>-<dimension>`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, text: &str) -> String {
        text_fingerprint(&self.namespace, text)
    }

    async fn cached(&self, key: &str) -> Option<Vec<f32>> {
        self.cache
            .get_json::<Vec<f32>>(key)
            .await
            .filter(|v| v.len() == self.inner.dimension())
    }
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized + 'static> EmbeddingProvider for CachedEmbeddingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        self.inner.initialize().await
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    #[instrument(skip(self, text), fields(namespace = %self.namespace))]
    async fn embed(&self, text: &str) -> KnowledgeResult<Vec<f32>> {
        let key = self.key(text);
        if let Some(vector) = self.cached(&key).await {
            return Ok(vector);
        }

        let _guard = self.in_flight.lock(&key).await;
        // another caller may have filled it while we waited
        if let Some(vector) = self.cached(&key).await {
            return Ok(vector);
        }

        let vector = self.inner.embed(text).await?;
        self.cache.put_json(&key, &vector, None).await;
        debug!("Embedding cached");
        Ok(vector)
    }

    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> KnowledgeResult<Vec<EmbeddingOutput>> {
        let mut resolved: HashMap<String, Vec<f32>> = HashMap::new();
        let mut misses: Vec<EmbeddingInput> = Vec::new();

        for input in inputs {
            let key = self.key(&input.text);
            if resolved.contains_key(&key) || misses.iter().any(|m| m.id == key) {
                continue;
            }
            match self.cached(&key).await {
                Some(vector) => {
                    resolved.insert(key, vector);
                }
                None => misses.push(EmbeddingInput::new(key, input.text.clone())),
            }
        }

        if !misses.is_empty() {
            debug!(misses = misses.len(), total = inputs.len(), "Embedding batch cache misses");
            for output in self.inner.embed_batch(&misses).await? {
                self.cache.put_json(&output.id, &output.vector, None).await;
                resolved.insert(output.id, output.vector);
            }
        }

        inputs
            .iter()
            .map(|input| {
                let key = self.key(&input.text);
                let vector = resolved.get(&key).cloned().ok_or_else(|| {
                    KnowledgeError::ModelUnavailable(format!(
                        "provider returned no embedding for input {}",
                        input.id
                    ))
                })?;
                Ok(EmbeddingOutput {
                    id: input.id.clone(),
                    vector,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn initialize(&self) -> KnowledgeResult<()> {
            Ok(())
        }

        fn is_initialized(&self) -> bool {
            true
        }

        async fn embed(&self, text: &str) -> KnowledgeResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn setup() -> (Arc<CountingProvider>, CachedEmbeddingProvider<CountingProvider>) {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(CacheManager::memory_only(100, Duration::from_secs(60)));
        let provider = CachedEmbeddingProvider::new(inner.clone(), cache, "counting-model");
        (inner, provider)
    }

    #[tokio::test]
    async fn test_repeated_text_hits_cache() {
        let (inner, provider) = setup();

        let first = provider.embed("async retry").await.unwrap();
        let second = provider.embed("  async   retry ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.namespace(), "counting-model-2");
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_call() {
        let (inner, provider) = setup();
        let provider = Arc::new(provider);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.embed("same text").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_embeds_only_misses() {
        let (inner, provider) = setup();
        provider.embed("cached").await.unwrap();

        let outputs = provider
            .embed_batch(&[
                EmbeddingInput::new("a", "cached"),
                EmbeddingInput::new("b", "fresh"),
                EmbeddingInput::new("c", "fresh"),
            ])
            .await
            .unwrap();

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[1].vector, outputs[2].vector);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_passes_through() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let provider =
            CachedEmbeddingProvider::new(inner.clone(), Arc::new(CacheManager::disabled()), "m");

        provider.embed("x").await.unwrap();
        provider.embed("x").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
