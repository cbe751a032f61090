pub mod component;
pub mod config;
pub mod embedding;
pub mod index;
pub mod pattern;
pub mod search;

pub use component::{ComponentState, ComponentStatus};
pub use config::{
    CacheConfig, Config, DialectSetting, EmbeddingConfig, EmbeddingProviderKind, IndexBackend,
    KnowledgeBaseConfig, LifecycleConfig, LoggingConfig, OpenAiSettings, RetryConfig,
    VectorIndexConfig,
};
pub use embedding::EmbeddingModel;
pub use index::{CollectionSpec, Distance, IndexPoint, ScoredPoint, SearchQuery};
pub use pattern::{
    payload_text, split_payload, validate_metadata, Metadata, MetadataValue, Pattern,
    RESERVED_PREFIX,
};
pub use search::{Filter, RangeBounds, SearchResponse, SearchResult, MAX_FILTER_DEPTH};
