//! Caching decorators over domain ports.
//!
//! Decorators delegate to [`CacheManager`](crate::infrastructure::cache::CacheManager)
//! so the wrapped implementation stays substitutable.

pub mod cached_embedding_provider;

pub use cached_embedding_provider::CachedEmbeddingProvider;
