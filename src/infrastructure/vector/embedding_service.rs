//! Embedding service implementation
//!
//! Local encoder for the sentence-embedding models in [`EmbeddingModel`].
//! Text is lowercased and split on non-alphanumeric characters; each token
//! contributes itself plus its padded character n-grams, hashed into the
//! model's dimensionality and L2-normalized. Accumulation is non-negative, so
//! any two texts sharing a word fragment score above zero and identical texts
//! produce identical vectors.
//!
//! The model descriptor (`model.json`) is loaded lazily from the configured
//! artifact directory, once, under a single-entry lock. Without a directory
//! the built-in descriptor for the selected model is used.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::domain::errors::{KnowledgeError, KnowledgeResult};
use crate::domain::models::{EmbeddingConfig, EmbeddingModel};
use crate::domain::ports::EmbeddingProvider;
use crate::infrastructure::vector::retry::RetryPolicy;

/// File name of the model descriptor inside the artifact directory.
pub const MODEL_DESCRIPTOR: &str = "model.json";

const DEFAULT_NGRAM: usize = 3;

/// Model descriptor as stored on disk.
#[derive(Debug, Clone, Deserialize)]
struct ModelDescriptor {
    name: String,
    dimension: usize,
    #[serde(default = "default_ngram")]
    ngram: usize,
    #[serde(default)]
    seed: u64,
}

const fn default_ngram() -> usize {
    DEFAULT_NGRAM
}

impl ModelDescriptor {
    fn builtin(model: EmbeddingModel) -> Self {
        Self {
            name: model.model_name().to_string(),
            dimension: model.dimensions(),
            ngram: DEFAULT_NGRAM,
            seed: 0,
        }
    }
}

/// Loaded encoder state.
#[derive(Debug)]
struct NgramEncoder {
    dimension: usize,
    ngram: usize,
    seed: u64,
}

impl NgramEncoder {
    fn bucket(&self, feature: &str) -> usize {
        // FNV-1a; stable across processes so stored vectors stay comparable
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ self.seed;
        for byte in feature.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            embedding[self.bucket(token)] += 1.0;

            let padded: Vec<char> = format!(" {token} ").chars().collect();
            if padded.len() <= self.ngram {
                continue;
            }
            for window in padded.windows(self.ngram) {
                let gram: String = window.iter().collect();
                embedding[self.bucket(&gram)] += 1.0;
            }
        }

        let magnitude = embedding
            .iter()
            .map(|x| f64::from(*x) * f64::from(*x))
            .sum::<f64>()
            .sqrt() as f32;

        if magnitude > 1e-10 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        } else {
            let uniform = 1.0 / (self.dimension as f32).sqrt();
            embedding.iter_mut().for_each(|v| *v = uniform);
        }

        embedding
    }
}

/// Local embedding service.
pub struct LocalEmbeddingService {
    model: EmbeddingModel,
    model_dir: Option<PathBuf>,
    load_timeout: Duration,
    load_retry: RetryPolicy,
    encoder: OnceCell<NgramEncoder>,
    loads: AtomicUsize,
}

impl LocalEmbeddingService {
    /// Create a service for a local model using the built-in descriptor.
    pub fn new(model: EmbeddingModel) -> KnowledgeResult<Self> {
        if !model.is_local() {
            return Err(KnowledgeError::Configuration(format!(
                "LocalEmbeddingService only supports local models, {model} requires API access"
            )));
        }

        Ok(Self {
            model,
            model_dir: None,
            load_timeout: Duration::from_secs(30),
            load_retry: RetryPolicy::new(2, Duration::from_millis(100), Duration::from_secs(1)),
            encoder: OnceCell::new(),
            loads: AtomicUsize::new(0),
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> KnowledgeResult<Self> {
        let mut service = Self::new(config.model)?;
        service.model_dir = config.model_dir.as_ref().map(PathBuf::from);
        service.load_timeout = Duration::from_millis(config.load_timeout_ms);
        service.load_retry = RetryPolicy::new(
            config.load_retries,
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
        .with_max_elapsed(service.load_timeout);
        Ok(service)
    }

    /// Load the descriptor from `dir` instead of using the built-in one.
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn model(&self) -> EmbeddingModel {
        self.model
    }

    /// Number of completed model loads.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    async fn read_descriptor(&self, dir: &Path) -> KnowledgeResult<ModelDescriptor> {
        let path = dir.join(MODEL_DESCRIPTOR);

        let raw = self
            .load_retry
            .execute("load_model", || tokio::fs::read(&path))
            .await
            .map_err(|e| {
                KnowledgeError::ModelUnavailable(format!(
                    "cannot read model artifact {}: {e}",
                    path.display()
                ))
            })?;

        let descriptor: ModelDescriptor = serde_json::from_slice(&raw).map_err(|e| {
            KnowledgeError::ModelUnavailable(format!(
                "malformed model artifact {}: {e}",
                path.display()
            ))
        })?;

        if descriptor.dimension != self.model.dimensions() {
            return Err(KnowledgeError::ModelUnavailable(format!(
                "model artifact '{}' has dimension {}, {} requires {}",
                descriptor.name,
                descriptor.dimension,
                self.model,
                self.model.dimensions()
            )));
        }
        if descriptor.ngram == 0 {
            return Err(KnowledgeError::ModelUnavailable(format!(
                "model artifact '{}' has n-gram size 0",
                descriptor.name
            )));
        }

        Ok(descriptor)
    }

    async fn load(&self) -> KnowledgeResult<NgramEncoder> {
        let descriptor = match &self.model_dir {
            Some(dir) => {
                tokio::time::timeout(self.load_timeout, self.read_descriptor(dir))
                    .await
                    .map_err(|_| KnowledgeError::timeout("load_model", self.load_timeout))??
            }
            None => ModelDescriptor::builtin(self.model),
        };

        self.loads.fetch_add(1, Ordering::SeqCst);
        info!(
            model = %descriptor.name,
            dimension = descriptor.dimension,
            ngram = descriptor.ngram,
            "Embedding model loaded"
        );

        Ok(NgramEncoder {
            dimension: descriptor.dimension,
            ngram: descriptor.ngram,
            seed: descriptor.seed,
        })
    }

    async fn encoder(&self) -> KnowledgeResult<&NgramEncoder> {
        self.encoder.get_or_try_init(|| self.load()).await
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingService {
    fn name(&self) -> &str {
        "local"
    }

    fn dimension(&self) -> usize {
        self.model.dimensions()
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        self.encoder().await.map(|_| ())
    }

    fn is_initialized(&self) -> bool {
        self.encoder.initialized()
    }

    async fn embed(&self, text: &str) -> KnowledgeResult<Vec<f32>> {
        let encoder = self.encoder().await?;
        debug!(chars = text.len(), "Encoding text");
        Ok(encoder.encode(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Distance;
    use crate::domain::ports::EmbeddingInput;
    use std::sync::Arc;

    fn service() -> LocalEmbeddingService {
        LocalEmbeddingService::new(EmbeddingModel::LocalMiniLM).expect("Failed to create service")
    }

    #[tokio::test]
    async fn test_embed_single() {
        let embedding = service().embed("Hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let inputs = vec![
            EmbeddingInput::new("a", "Hello"),
            EmbeddingInput::new("b", "World"),
        ];
        let outputs = service().embed_batch(&inputs).await.unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1].id, "b");
        assert_eq!(outputs[1].vector.len(), 384);
    }

    #[tokio::test]
    async fn test_related_phrases_score_positive() {
        let service = service();
        let a = service.embed("async retry pattern").await.unwrap();
        let b = service.embed("retrying failed operations").await.unwrap();
        let c = service.embed("async retry pattern").await.unwrap();

        assert!(Distance::Cosine.score(&a, &b) > 0.0);
        assert!(Distance::Cosine.score(&a, &c) > 0.999);
    }

    #[test]
    fn test_non_local_model_rejected() {
        assert!(LocalEmbeddingService::new(EmbeddingModel::OpenAISmall).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_loads_once() {
        let service = Arc::new(service());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.initialize().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(service.is_initialized());
        assert_eq!(service.load_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let service = service().with_model_dir(dir.path());

        let err = service.initialize().await.unwrap_err();
        assert!(matches!(err, KnowledgeError::ModelUnavailable(_)));
        assert!(!service.is_initialized());
    }

    #[tokio::test]
    async fn test_artifact_dimension_must_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MODEL_DESCRIPTOR),
            r#"{"name": "tiny", "dimension": 16}"#,
        )
        .unwrap();

        let err = service().with_model_dir(dir.path()).initialize().await.unwrap_err();
        assert!(matches!(err, KnowledgeError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_artifact_loaded_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MODEL_DESCRIPTOR),
            r#"{"name": "minilm-ngram", "dimension": 384, "ngram": 4, "seed": 7}"#,
        )
        .unwrap();

        let service = service().with_model_dir(dir.path());
        let builtin = self::service().embed("pattern").await.unwrap();
        let loaded = service.embed("pattern").await.unwrap();

        assert_eq!(loaded.len(), 384);
        assert_ne!(loaded, builtin);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn encoder() -> NgramEncoder {
        NgramEncoder {
            dimension: 384,
            ngram: DEFAULT_NGRAM,
            seed: 0,
        }
    }

    proptest! {
        #[test]
        fn proptest_embedding_determinism(text in "[a-zA-Z0-9 .,!?;:'\"-]{0,500}") {
            let encoder = encoder();
            prop_assert_eq!(encoder.encode(&text), encoder.encode(&text));
        }

        #[test]
        fn proptest_l2_normalization(text in "[a-zA-Z0-9 .,!?;:'\"-]{0,500}") {
            let embedding = encoder().encode(&text);
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

            prop_assert_eq!(embedding.len(), 384);
            prop_assert!((magnitude - 1.0).abs() < 1e-4, "norm was {}", magnitude);
            prop_assert!(embedding.iter().all(|v| v.is_finite() && *v >= 0.0));
        }
    }
}
