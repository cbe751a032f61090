//! Service layer: the knowledge base and the lifecycle that starts it.

pub mod component_registry;
pub mod components;
pub mod knowledge_base;

pub use component_registry::{ComponentRegistry, RegistryConfig};
pub use components::{
    CacheComponent, ConfigComponent, EmbeddingComponent, KnowledgeBaseComponent,
    VectorIndexComponent,
};
pub use knowledge_base::{
    IndexAvailability, KnowledgeBase, PatternUpdate, SearchRequest, DEFAULT_QUERY_TTL,
};
