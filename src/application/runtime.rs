//! Runtime assembly.
//!
//! Builds every part of the retrieval core from configuration, registers
//! them with the component registry in dependency order and starts them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::adapters::cache::CachedEmbeddingProvider;
use crate::adapters::embeddings::OpenAiEmbeddingProvider;
use crate::domain::errors::KnowledgeResult;
use crate::domain::models::{
    CollectionSpec, ComponentState, Config, EmbeddingProviderKind, IndexBackend,
};
use crate::domain::ports::{ComponentSpec, EmbeddingProvider, VectorIndex};
use crate::infrastructure::cache::CacheManager;
use crate::infrastructure::vector::{HttpVectorIndex, InMemoryVectorIndex, LocalEmbeddingService};
use crate::services::components::{
    CacheComponent, ConfigComponent, EmbeddingComponent, KnowledgeBaseComponent,
    VectorIndexComponent, CACHE, CONFIG, EMBEDDING, KNOWLEDGE_BASE, VECTOR_INDEX,
};
use crate::services::{ComponentRegistry, IndexAvailability, KnowledgeBase, RegistryConfig};

/// A started retrieval core.
pub struct KnowledgeRuntime {
    registry: ComponentRegistry,
    knowledge_base: Arc<KnowledgeBase>,
    cache: Arc<CacheManager>,
}

/// Builder for [`KnowledgeRuntime`]; lets tests swap in their own provider
/// or index.
pub struct RuntimeBuilder {
    config: Config,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl RuntimeBuilder {
    /// Use this provider instead of the configured one. It is still wrapped
    /// in the embedding cache.
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build all parts and run startup. On a critical failure everything
    /// already started is torn down and the aggregated error returned.
    #[instrument(skip(self), fields(collection = %self.config.vector_index.collection))]
    pub async fn start(self) -> KnowledgeResult<KnowledgeRuntime> {
        let config = Arc::new(self.config);

        let (raw_embedder, model_name) = match self.embedder {
            Some(provider) => {
                let name = provider.name().to_string();
                (provider, name)
            }
            None => build_embedder(&config)?,
        };

        let cache = Arc::new(CacheManager::open(&config.cache).await);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(CachedEmbeddingProvider::new(
            raw_embedder,
            Arc::clone(&cache),
            &model_name,
        ));

        let index = match self.index {
            Some(index) => index,
            None => build_index(&config)?,
        };

        let query_cache = Arc::new(if config.cache.enabled {
            CacheManager::memory_only(
                config.cache.memory_capacity,
                Duration::from_secs(config.cache.query_ttl_secs),
            )
        } else {
            CacheManager::disabled()
        });

        let collection = CollectionSpec::new(
            config.vector_index.collection.clone(),
            embedder.dimension(),
            config.vector_index.distance,
        );

        let availability = IndexAvailability::new(false);
        let knowledge_base = Arc::new(
            KnowledgeBase::new(
                Arc::clone(&embedder),
                Arc::clone(&index),
                config.knowledge_base.clone(),
            )
            .with_query_cache(query_cache)
            .with_collection(collection.clone())
            .with_availability(availability.clone()),
        );

        let mut registry = ComponentRegistry::new(RegistryConfig::from(&config.lifecycle));
        registry.register(
            ComponentSpec::new(CONFIG),
            Arc::new(ConfigComponent::new(Arc::clone(&config))),
        )?;
        registry.register(
            ComponentSpec::new(EMBEDDING).depends_on(CONFIG),
            Arc::new(EmbeddingComponent::new(Arc::clone(&embedder))),
        )?;
        registry.register(
            ComponentSpec::new(VECTOR_INDEX)
                .depends_on(EMBEDDING)
                .critical(config.vector_index.critical),
            Arc::new(VectorIndexComponent::new(
                Arc::clone(&index),
                collection,
                availability,
            )),
        )?;
        registry.register(
            ComponentSpec::new(CACHE).depends_on(CONFIG).non_critical(),
            Arc::new(CacheComponent::new(
                Arc::clone(&cache),
                Duration::from_secs(config.cache.compaction_interval_secs),
            )),
        )?;
        registry.register(
            ComponentSpec::new(KNOWLEDGE_BASE)
                .depends_on(EMBEDDING)
                .depends_on(VECTOR_INDEX)
                .depends_on(CACHE),
            Arc::new(KnowledgeBaseComponent::new(Arc::clone(&knowledge_base))),
        )?;

        registry.initialize_all().await?;
        info!(
            embedding = %model_name,
            index = index.name(),
            ready = registry.is_ready(),
            "Knowledge runtime started"
        );

        Ok(KnowledgeRuntime {
            registry,
            knowledge_base,
            cache,
        })
    }
}

impl KnowledgeRuntime {
    pub fn builder(config: Config) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            embedder: None,
            index: None,
        }
    }

    /// Build and start everything from `config`.
    pub async fn start(config: Config) -> KnowledgeResult<Self> {
        Self::builder(config).start().await
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Per-component status snapshot.
    pub fn health(&self) -> Arc<Vec<ComponentState>> {
        self.registry.health()
    }

    /// Tear down in reverse start order.
    pub async fn shutdown(self) -> KnowledgeResult<()> {
        let result = self.registry.shutdown_all().await;
        info!("Knowledge runtime stopped");
        result
    }
}

fn build_embedder(config: &Config) -> KnowledgeResult<(Arc<dyn EmbeddingProvider>, String)> {
    match config.embedding.provider {
        EmbeddingProviderKind::Local => {
            let service = LocalEmbeddingService::from_config(&config.embedding)?;
            let name = service.model().model_name().to_string();
            Ok((Arc::new(service), name))
        }
        EmbeddingProviderKind::Openai => {
            let settings = config.embedding.openai.clone();
            let name = settings.model.clone();
            Ok((Arc::new(OpenAiEmbeddingProvider::new(settings)?), name))
        }
    }
}

fn build_index(config: &Config) -> KnowledgeResult<Arc<dyn VectorIndex>> {
    Ok(match config.vector_index.backend {
        IndexBackend::Http => Arc::new(HttpVectorIndex::new(&config.vector_index)?),
        IndexBackend::Memory => Arc::new(InMemoryVectorIndex::new(
            config.vector_index.collection.clone(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ComponentStatus, Metadata};

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.vector_index.backend = IndexBackend::Memory;
        config.lifecycle.init_retries = 0;
        config
    }

    #[tokio::test]
    async fn test_start_with_memory_backend() {
        let runtime = KnowledgeRuntime::start(memory_config()).await.unwrap();

        let names: Vec<_> = runtime.health().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec![CONFIG, EMBEDDING, VECTOR_INDEX, CACHE, KNOWLEDGE_BASE]);
        assert!(runtime
            .health()
            .iter()
            .all(|s| s.status == ComponentStatus::Initialized));

        let kb = runtime.knowledge_base().clone();
        let id = kb.add("graceful shutdown", Metadata::new()).await.unwrap();
        assert!(kb.search("graceful shutdown", None, None, None).await.unwrap().contains(&id));

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_non_critical_index_degrades() {
        let index = Arc::new(InMemoryVectorIndex::new("patterns"));
        index.set_available(false);

        let runtime = KnowledgeRuntime::builder(memory_config())
            .with_vector_index(index)
            .start()
            .await
            .unwrap();

        let vector = runtime
            .health()
            .iter()
            .find(|s| s.name == VECTOR_INDEX)
            .map(|s| s.status);
        assert_eq!(vector, Some(ComponentStatus::Degraded));

        let response = runtime
            .knowledge_base()
            .search("anything", None, None, None)
            .await
            .unwrap();
        assert!(response.degraded);
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_critical_index_failure_aborts_startup() {
        let index = Arc::new(InMemoryVectorIndex::new("patterns"));
        index.set_available(false);
        let mut config = memory_config();
        config.vector_index.critical = true;

        let result = KnowledgeRuntime::builder(config)
            .with_vector_index(index)
            .start()
            .await;
        assert!(matches!(
            result,
            Err(crate::domain::errors::KnowledgeError::StartupAborted(_))
        ));
    }
}
