//! Embedding provider port for semantic vector generation.
//!
//! Defines the trait for embedding providers that convert text into
//! dense vector representations for semantic similarity search.

use async_trait::async_trait;

use crate::domain::errors::KnowledgeResult;

/// A single embedding request item.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    /// Client-side ID for correlation.
    pub id: String,
    /// Text to embed.
    pub text: String,
}

impl EmbeddingInput {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A single embedding result.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// Correlation ID matching the input.
    pub id: String,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

/// Trait for embedding providers.
///
/// Providers load their model lazily: `embed` before `initialize` performs the
/// load, and repeated or concurrent `initialize` calls load at most once.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g., "local", "openai").
    fn name(&self) -> &str;

    /// Fixed output dimensionality.
    fn dimension(&self) -> usize;

    /// Load the model. Idempotent.
    async fn initialize(&self) -> KnowledgeResult<()>;

    /// Whether the model has been loaded.
    fn is_initialized(&self) -> bool;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> KnowledgeResult<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    ///
    /// Implementations handle chunking if the backend has per-request limits.
    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> KnowledgeResult<Vec<EmbeddingOutput>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(EmbeddingOutput {
                id: input.id.clone(),
                vector: self.embed(&input.text).await?,
            });
        }
        Ok(outputs)
    }
}
