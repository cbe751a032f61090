//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use patternbase::domain::models::{EmbeddingModel, IndexBackend};
use patternbase::infrastructure::vector::{LocalEmbeddingService, RetryPolicy};
use patternbase::{Config, EmbeddingProvider, KnowledgeResult};

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Configuration for an in-process runtime: memory index, local encoder,
/// no startup retries.
pub fn memory_config() -> Config {
    let mut config = Config::default();
    config.vector_index.backend = IndexBackend::Memory;
    config.lifecycle.init_retries = 0;
    config
}

/// Retry policy with millisecond backoff for HTTP tests.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(4))
        .with_jitter(0.0)
        .with_max_elapsed(Duration::from_secs(5))
}

/// Local encoder that counts calls reaching it.
pub struct CountingProvider {
    inner: LocalEmbeddingService,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new() -> Self {
        Self {
            inner: LocalEmbeddingService::new(EmbeddingModel::LocalMiniLM)
                .expect("MiniLM is a local model"),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn initialize(&self) -> KnowledgeResult<()> {
        self.inner.initialize().await
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    async fn embed(&self, text: &str) -> KnowledgeResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }
}
