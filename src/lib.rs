//! Patternbase - vector-backed pattern knowledge base
//!
//! Turns text and code into embeddings, stores and searches them in an
//! external vector index, and keeps callers working through index outages
//! with layered caching and degraded-mode reads.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and port traits
//! - **Adapters** (`adapters`): Remote embedding providers and caching decorators
//! - **Infrastructure Layer** (`infrastructure`): Config, logging, cache tiers, vector index clients
//! - **Service Layer** (`services`): Knowledge base and component lifecycle
//! - **Application Layer** (`application`): Runtime assembly
//! - **CLI Layer** (`cli`): Operator command-line interface
//!
//! # Example
//!
//! ```ignore
//! use patternbase::{ConfigLoader, KnowledgeRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = KnowledgeRuntime::start(ConfigLoader::load()?).await?;
//!     let hits = runtime
//!         .knowledge_base()
//!         .search("retrying failed operations", None, Some(5), None)
//!         .await?;
//!     println!("{} hits", hits.len());
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::KnowledgeRuntime;
pub use domain::errors::{KnowledgeError, KnowledgeResult};
pub use domain::models::{
    Config, Filter, Metadata, MetadataValue, Pattern, RangeBounds, SearchResponse, SearchResult,
};
pub use domain::ports::{EmbeddingProvider, VectorIndex};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{KnowledgeBase, PatternUpdate, SearchRequest};
