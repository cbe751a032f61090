//! Component lifecycle models
//!
//! State records owned by the component registry and exposed read-only to
//! health reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Uninitialized,
    Initializing,
    Initialized,
    /// Non-critical component failed to start; dependents run reduced.
    Degraded,
    Failed,
    Stopped,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the component holds live resources that need teardown.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Initialized | Self::Degraded)
    }

    /// Allowed transitions within and across lifecycle passes.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use ComponentStatus::{Degraded, Failed, Initialized, Initializing, Stopped, Uninitialized};

        matches!(
            (self, next),
            (Uninitialized | Stopped | Failed, Initializing)
                | (Initializing, Initialized | Degraded | Failed)
                | (Initialized | Degraded, Stopped | Failed)
                // a dependency that never came up blocks its dependents
                | (Uninitialized, Failed)
        )
    }
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time state of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub name: String,
    pub status: ComponentStatus,
    pub critical: bool,
    /// Last failure detail.
    pub error: Option<String>,
    /// Initialization attempts beyond the first.
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl ComponentState {
    pub fn new(name: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            status: ComponentStatus::Uninitialized,
            critical,
            error: None,
            retry_count: 0,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(ComponentStatus::Uninitialized.can_transition_to(ComponentStatus::Initializing));
        assert!(ComponentStatus::Initializing.can_transition_to(ComponentStatus::Initialized));
        assert!(ComponentStatus::Initializing.can_transition_to(ComponentStatus::Degraded));
        assert!(ComponentStatus::Initialized.can_transition_to(ComponentStatus::Stopped));
        assert!(ComponentStatus::Stopped.can_transition_to(ComponentStatus::Initializing));
    }

    #[test]
    fn test_no_silent_reset() {
        assert!(!ComponentStatus::Initialized.can_transition_to(ComponentStatus::Uninitialized));
        assert!(!ComponentStatus::Initialized.can_transition_to(ComponentStatus::Initializing));
        assert!(!ComponentStatus::Stopped.can_transition_to(ComponentStatus::Initialized));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ComponentStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
