//! Remote embedding providers.

pub mod openai;

pub use openai::OpenAiEmbeddingProvider;
