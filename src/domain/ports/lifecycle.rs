//! Lifecycle port for components managed by the registry.

use async_trait::async_trait;

use crate::domain::errors::KnowledgeResult;

/// Registration record for a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: String,
    pub dependencies: Vec<String>,
    /// Critical failures abort startup; others leave the component degraded.
    pub critical: bool,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            critical: true,
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

/// A unit with a start/stop lifecycle.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    /// Acquire resources. May be called again after a failed attempt.
    async fn initialize(&self) -> KnowledgeResult<()>;

    /// Release resources.
    async fn shutdown(&self) -> KnowledgeResult<()>;
}
