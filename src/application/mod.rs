//! Application layer: assembles and runs the retrieval core.

pub mod runtime;

pub use runtime::{KnowledgeRuntime, RuntimeBuilder};
