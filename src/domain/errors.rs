//! Domain errors for the patternbase retrieval core.

use std::time::Duration;

use thiserror::Error;

use crate::domain::models::ComponentStatus;

/// A single component failure collected during startup or teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFailure {
    /// Component name as registered.
    pub component: String,
    /// Rendered error detail.
    pub error: String,
}

impl ComponentFailure {
    pub fn new(component: impl Into<String>, error: impl ToString) -> Self {
        Self {
            component: component.into(),
            error: error.to_string(),
        }
    }
}

impl std::fmt::Display for ComponentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.component, self.error)
    }
}

fn format_failures(failures: &[ComponentFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the knowledge retrieval core.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Schema conflict on collection '{collection}': expected vector size {expected}, got {actual}")]
    SchemaConflict {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Operation '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Component '{component}' cannot start: dependency '{dependency}' is {status}")]
    DependencyNotReady {
        component: String,
        dependency: String,
        status: ComponentStatus,
    },

    #[error("Write rejected while the vector index is unavailable: {0}")]
    WriteUnavailable(String),

    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Vector index rejected request: {0}")]
    IndexRejected(String),

    #[error("Collection '{0}' does not exist in the vector index")]
    CollectionMissing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Startup aborted: {}", format_failures(.0))]
    StartupAborted(Vec<ComponentFailure>),

    #[error("Teardown finished with errors: {}", format_failures(.0))]
    TeardownFailed(Vec<ComponentFailure>),

    #[error("Component dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Component already registered: {0}")]
    DuplicateComponent(String),
}

impl KnowledgeError {
    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Returns true if retrying the same operation later may succeed.
    ///
    /// `ModelUnavailable` and `SchemaConflict` indicate configuration problems
    /// and are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IndexUnavailable(_) | Self::Timeout { .. })
    }

    /// Returns true if the index cannot serve requests right now.
    ///
    /// A missing collection counts: the next successful availability check
    /// recreates it.
    pub fn is_index_unavailable(&self) -> bool {
        matches!(self, Self::IndexUnavailable(_) | Self::CollectionMissing(_))
    }

    /// Returns true if startup must stop whatever the component's criticality.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SchemaConflict { .. } | Self::ModelUnavailable(_))
    }
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

impl From<serde_json::Error> for KnowledgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(KnowledgeError::IndexUnavailable("down".to_string()).is_retryable());
        assert!(KnowledgeError::timeout("search", Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_configuration_errors_not_retryable() {
        assert!(!KnowledgeError::ModelUnavailable("missing".to_string()).is_retryable());
        assert!(!KnowledgeError::SchemaConflict {
            collection: "patterns".to_string(),
            expected: 384,
            actual: 768,
        }
        .is_retryable());
        assert!(!KnowledgeError::WriteUnavailable("degraded".to_string()).is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(KnowledgeError::ModelUnavailable("missing".to_string()).is_fatal());
        assert!(KnowledgeError::SchemaConflict {
            collection: "patterns".to_string(),
            expected: 384,
            actual: 768,
        }
        .is_fatal());
        assert!(!KnowledgeError::IndexUnavailable("down".to_string()).is_fatal());
        assert!(!KnowledgeError::CollectionMissing("patterns".to_string()).is_fatal());
    }

    #[test]
    fn test_aggregated_failures_render_every_component() {
        let err = KnowledgeError::StartupAborted(vec![
            ComponentFailure::new("vector_index", "connection refused"),
            ComponentFailure::new("embedding", "model missing"),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("vector_index: connection refused"));
        assert!(rendered.contains("embedding: model missing"));
    }

    #[test]
    fn test_cycle_rendering() {
        let err = KnowledgeError::DependencyCycle(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(err.to_string(), "Component dependency cycle detected: a -> b -> a");
    }
}
