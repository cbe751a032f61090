//! Embedding domain models
//!
//! Supported embedding models and their fixed output dimensionality.

use serde::{Deserialize, Serialize};

/// Embedding model types supported by the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EmbeddingModel {
    /// Local MiniLM model (all-MiniLM-L6-v2)
    /// - Dimensions: 384
    #[default]
    #[serde(rename = "local_minilm")]
    LocalMiniLM,

    /// Local MPNet model (all-mpnet-base-v2)
    /// - Dimensions: 768
    #[serde(rename = "local_mpnet")]
    LocalMPNet,

    /// OpenAI text-embedding-3-small (cloud-based, opt-in only)
    /// - Dimensions: 1536
    #[serde(rename = "openai_small")]
    OpenAISmall,
}

impl EmbeddingModel {
    /// Returns the vector dimensions for this model
    pub fn dimensions(&self) -> usize {
        match self {
            Self::LocalMiniLM => 384,
            Self::LocalMPNet => 768,
            Self::OpenAISmall => 1536,
        }
    }

    /// Returns the model identifier
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::LocalMiniLM => "sentence-transformers/all-MiniLM-L6-v2",
            Self::LocalMPNet => "sentence-transformers/all-mpnet-base-v2",
            Self::OpenAISmall => "text-embedding-3-small",
        }
    }

    /// Returns true if this is a local model (privacy-preserving)
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalMiniLM | Self::LocalMPNet)
    }
}

impl std::fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalMiniLM => write!(f, "all-MiniLM-L6-v2 (local)"),
            Self::LocalMPNet => write!(f, "all-mpnet-base-v2 (local)"),
            Self::OpenAISmall => write!(f, "text-embedding-3-small (OpenAI)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dimensions() {
        assert_eq!(EmbeddingModel::LocalMiniLM.dimensions(), 384);
        assert_eq!(EmbeddingModel::LocalMPNet.dimensions(), 768);
        assert_eq!(EmbeddingModel::OpenAISmall.dimensions(), 1536);
    }

    #[test]
    fn test_model_locality() {
        assert!(EmbeddingModel::LocalMiniLM.is_local());
        assert!(!EmbeddingModel::OpenAISmall.is_local());
        assert_eq!(EmbeddingModel::default(), EmbeddingModel::LocalMiniLM);
    }

    #[test]
    fn test_model_config_spelling() {
        let model: EmbeddingModel = serde_json::from_str("\"local_mpnet\"").unwrap();
        assert_eq!(model, EmbeddingModel::LocalMPNet);
    }
}
