//! Lifecycle adapters that put each part of the retrieval core under the
//! component registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::{CollectionSpec, Config};
use crate::domain::ports::{Component, EmbeddingProvider, VectorIndex};
use crate::infrastructure::cache::CacheManager;
use crate::infrastructure::config::ConfigLoader;
use crate::services::knowledge_base::{IndexAvailability, KnowledgeBase};

pub const CONFIG: &str = "config";
pub const EMBEDDING: &str = "embedding";
pub const VECTOR_INDEX: &str = "vector_index";
pub const CACHE: &str = "cache";
pub const KNOWLEDGE_BASE: &str = "knowledge_base";

/// Validates the loaded configuration.
pub struct ConfigComponent {
    config: Arc<Config>,
}

impl ConfigComponent {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Component for ConfigComponent {
    fn name(&self) -> &str {
        CONFIG
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        ConfigLoader::validate(&self.config)
            .map_err(|e| KnowledgeError::Configuration(e.to_string()))
    }

    async fn shutdown(&self) -> KnowledgeResult<()> {
        Ok(())
    }
}

/// Loads the embedding model.
pub struct EmbeddingComponent {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingComponent {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Component for EmbeddingComponent {
    fn name(&self) -> &str {
        EMBEDDING
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        self.provider.initialize().await?;
        info!(
            provider = self.provider.name(),
            dimension = self.provider.dimension(),
            "Embedding provider ready"
        );
        Ok(())
    }

    async fn shutdown(&self) -> KnowledgeResult<()> {
        Ok(())
    }
}

/// Ensures the collection exists and publishes index availability.
pub struct VectorIndexComponent {
    index: Arc<dyn VectorIndex>,
    collection: CollectionSpec,
    availability: IndexAvailability,
}

impl VectorIndexComponent {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        collection: CollectionSpec,
        availability: IndexAvailability,
    ) -> Self {
        Self {
            index,
            collection,
            availability,
        }
    }
}

#[async_trait]
impl Component for VectorIndexComponent {
    fn name(&self) -> &str {
        VECTOR_INDEX
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        match self.index.ensure_collection(&self.collection).await {
            Ok(()) => {
                self.availability.set(true);
                info!(
                    backend = self.index.name(),
                    collection = %self.collection.name,
                    vector_size = self.collection.vector_size,
                    "Vector index ready"
                );
                Ok(())
            }
            Err(err) => {
                self.availability.set(false);
                Err(err)
            }
        }
    }

    async fn shutdown(&self) -> KnowledgeResult<()> {
        self.availability.set(false);
        Ok(())
    }
}

/// Runs background disk compaction for the shared cache.
pub struct CacheComponent {
    cache: Arc<CacheManager>,
    compaction_interval: Duration,
}

impl CacheComponent {
    pub fn new(cache: Arc<CacheManager>, compaction_interval: Duration) -> Self {
        Self {
            cache,
            compaction_interval,
        }
    }
}

#[async_trait]
impl Component for CacheComponent {
    fn name(&self) -> &str {
        CACHE
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        if let Some(report) = self.cache.compact().await {
            debug!(
                expired = report.expired_removed,
                entries = report.entries_after,
                "Startup compaction finished"
            );
        }
        self.cache.start_compaction(self.compaction_interval).await;
        info!(
            enabled = self.cache.is_enabled(),
            disk = self.cache.is_disk_enabled(),
            "Cache ready"
        );
        Ok(())
    }

    async fn shutdown(&self) -> KnowledgeResult<()> {
        self.cache.shutdown().await;
        Ok(())
    }
}

/// Reports readiness of the knowledge base.
pub struct KnowledgeBaseComponent {
    knowledge_base: Arc<KnowledgeBase>,
}

impl KnowledgeBaseComponent {
    pub fn new(knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self { knowledge_base }
    }
}

#[async_trait]
impl Component for KnowledgeBaseComponent {
    fn name(&self) -> &str {
        KNOWLEDGE_BASE
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        let available = self.knowledge_base.availability().is_available();
        info!(
            index = self.knowledge_base.index().name(),
            degraded = !available,
            "Knowledge base ready"
        );
        Ok(())
    }

    async fn shutdown(&self) -> KnowledgeResult<()> {
        Ok(())
    }
}
