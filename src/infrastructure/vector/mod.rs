//! Vector infrastructure components
//!
//! Local embedding generation, the REST and in-memory vector index clients,
//! and the retry policy they share.

pub mod embedding_service;
pub mod errors;
pub mod http_index;
pub mod memory_index;
pub mod retry;

pub use embedding_service::LocalEmbeddingService;
pub use errors::IndexRequestError;
pub use http_index::{HttpVectorIndex, SearchDialect};
pub use memory_index::InMemoryVectorIndex;
pub use retry::{RetryPolicy, Retryable};
