//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - EmbeddingProvider: text to vector
//! - VectorIndex: vector database operations
//! - Component: lifecycle hooks driven by the registry

pub mod embedding;
pub mod lifecycle;
pub mod vector_index;

pub use embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
pub use lifecycle::{Component, ComponentSpec};
pub use vector_index::VectorIndex;
