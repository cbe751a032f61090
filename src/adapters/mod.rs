//! Adapters for external systems and decorators over domain ports.

pub mod cache;
pub mod embeddings;
