//! Component registry
//!
//! Dependency-ordered startup and reverse-order teardown for the retrieval
//! core, with per-component health state.
//!
//! The state table is only mutated by the flow running `initialize_all` or
//! `shutdown_all`. Every change publishes a fresh copy, so `health()` readers
//! always see a consistent snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{ComponentFailure, KnowledgeError, KnowledgeResult};
use crate::domain::models::{ComponentState, ComponentStatus, LifecycleConfig};
use crate::domain::ports::{Component, ComponentSpec};

/// Startup bounds applied to every component.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Deadline for a single `initialize` attempt
    pub init_timeout: Duration,
    /// Extra attempts after a retryable failure
    pub init_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub init_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

impl From<&LifecycleConfig> for RegistryConfig {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            init_timeout: Duration::from_millis(config.init_timeout_ms),
            init_retries: config.init_retries,
            init_backoff: Duration::from_millis(config.init_backoff_ms),
        }
    }
}

struct Registration {
    spec: ComponentSpec,
    component: Arc<dyn Component>,
}

pub struct ComponentRegistry {
    components: Vec<Registration>,
    /// Published state table, one entry per registration in the same order
    states: RwLock<Arc<Vec<ComponentState>>>,
    /// Indexes of components holding resources, in start order
    started: Mutex<Vec<usize>>,
    config: RegistryConfig,
}

impl ComponentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            components: Vec::new(),
            states: RwLock::new(Arc::new(Vec::new())),
            started: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Register a component. Dependencies may be registered later; they are
    /// resolved when `initialize_all` runs.
    pub fn register(
        &mut self,
        spec: ComponentSpec,
        component: Arc<dyn Component>,
    ) -> KnowledgeResult<()> {
        if self.position(&spec.name).is_some() {
            return Err(KnowledgeError::DuplicateComponent(spec.name));
        }

        debug!(component = %spec.name, dependencies = ?spec.dependencies, critical = spec.critical, "Registered component");
        let state = ComponentState::new(spec.name.clone(), spec.critical);
        self.publish(|states| states.push(state));
        self.components.push(Registration { spec, component });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Point-in-time copy of every component's state, in registration order.
    pub fn health(&self) -> Arc<Vec<ComponentState>> {
        match self.states.read() {
            Ok(states) => Arc::clone(&states),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn status(&self, name: &str) -> Option<ComponentStatus> {
        let idx = self.position(name)?;
        self.health().get(idx).map(|s| s.status)
    }

    /// Whether every critical component is up.
    pub fn is_ready(&self) -> bool {
        self.health()
            .iter()
            .all(|s| !s.critical || s.status == ComponentStatus::Initialized)
    }

    /// Start order: dependencies first, registration order among peers.
    pub fn startup_order(&self) -> KnowledgeResult<Vec<String>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|idx| self.components[idx].spec.name.clone())
            .collect())
    }

    /// Start every component in dependency order.
    ///
    /// Non-critical failures leave the component `Degraded` and startup
    /// continues. A critical failure, or a fatal error such as a schema
    /// conflict from any component, stops startup. What was started is torn
    /// down and `StartupAborted` lists every failure seen.
    pub async fn initialize_all(&self) -> KnowledgeResult<()> {
        let order = self.topological_order()?;
        let mut failures = Vec::new();
        let mut aborted = false;

        info!(components = order.len(), "Starting components");

        for idx in order {
            let spec = &self.components[idx].spec;
            if self.state_of(idx).status.is_running() {
                continue;
            }

            if let Some(err) = self.unready_dependency(idx) {
                failures.push(ComponentFailure::new(&spec.name, &err));
                if spec.critical {
                    error!(component = %spec.name, error = %err, "Critical component blocked by dependency");
                    self.transition(idx, ComponentStatus::Failed, Some(err.to_string()));
                    aborted = true;
                    break;
                }
                warn!(component = %spec.name, error = %err, "Component blocked by dependency, degraded");
                self.transition(idx, ComponentStatus::Initializing, None);
                self.transition(idx, ComponentStatus::Degraded, Some(err.to_string()));
                continue;
            }

            self.transition(idx, ComponentStatus::Initializing, None);
            match self.start_component(idx).await {
                Ok(()) => {
                    self.transition(idx, ComponentStatus::Initialized, None);
                    self.started.lock().await.push(idx);
                    info!(component = %spec.name, "Component initialized");
                }
                Err(err) if !spec.critical && !err.is_fatal() => {
                    warn!(component = %spec.name, error = %err, "Non-critical component failed, degraded");
                    failures.push(ComponentFailure::new(&spec.name, &err));
                    self.transition(idx, ComponentStatus::Degraded, Some(err.to_string()));
                    // may hold partial resources
                    self.started.lock().await.push(idx);
                }
                Err(err) => {
                    error!(component = %spec.name, critical = spec.critical, error = %err, "Component failed, aborting startup");
                    failures.push(ComponentFailure::new(&spec.name, &err));
                    self.transition(idx, ComponentStatus::Failed, Some(err.to_string()));
                    aborted = true;
                    break;
                }
            }
        }

        if aborted {
            if let Err(KnowledgeError::TeardownFailed(teardown)) = self.shutdown_all().await {
                failures.extend(teardown);
            }
            return Err(KnowledgeError::StartupAborted(failures));
        }

        if !failures.is_empty() {
            warn!(degraded = failures.len(), "Startup finished in degraded mode");
        }
        Ok(())
    }

    /// Stop every started component in reverse start order.
    ///
    /// Best effort: a failing teardown does not stop the rest, and every
    /// error is returned together as `TeardownFailed`.
    pub async fn shutdown_all(&self) -> KnowledgeResult<()> {
        let started = std::mem::take(&mut *self.started.lock().await);
        let mut failures = Vec::new();

        for idx in started.into_iter().rev() {
            let Registration { spec, component } = &self.components[idx];
            let result = tokio::time::timeout(self.config.init_timeout, component.shutdown())
                .await
                .unwrap_or_else(|_| {
                    Err(KnowledgeError::timeout(
                        format!("{} shutdown", spec.name),
                        self.config.init_timeout,
                    ))
                });

            match result {
                Ok(()) => {
                    self.transition(idx, ComponentStatus::Stopped, None);
                    debug!(component = %spec.name, "Component stopped");
                }
                Err(err) => {
                    warn!(component = %spec.name, error = %err, "Component teardown failed");
                    self.transition(idx, ComponentStatus::Failed, Some(err.to_string()));
                    failures.push(ComponentFailure::new(&spec.name, &err));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(KnowledgeError::TeardownFailed(failures))
        }
    }

    /// Run `initialize` under the timeout, retrying retryable errors.
    async fn start_component(&self, idx: usize) -> KnowledgeResult<()> {
        let Registration { spec, component } = &self.components[idx];
        let mut attempt = 0u32;

        loop {
            let result = tokio::time::timeout(self.config.init_timeout, component.initialize())
                .await
                .unwrap_or_else(|_| {
                    Err(KnowledgeError::timeout(
                        format!("{} initialize", spec.name),
                        self.config.init_timeout,
                    ))
                });

            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.config.init_retries => {
                    let delay = self
                        .config
                        .init_backoff
                        .saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        component = %spec.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Component initialization failed, retrying"
                    );
                    self.publish(|states| {
                        states[idx].retry_count = attempt;
                        states[idx].error = Some(err.to_string());
                        states[idx].updated_at = Utc::now();
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// First dependency that is not ready, as a `DependencyNotReady` error.
    fn unready_dependency(&self, idx: usize) -> Option<KnowledgeError> {
        let states = self.health();
        let spec = &self.components[idx].spec;

        spec.dependencies.iter().find_map(|dependency| {
            let dep_idx = self.position(dependency)?;
            let dep = &states[dep_idx];
            let ready = match dep.status {
                ComponentStatus::Initialized => true,
                ComponentStatus::Degraded => !dep.critical,
                _ => false,
            };
            (!ready).then(|| KnowledgeError::DependencyNotReady {
                component: spec.name.clone(),
                dependency: dependency.clone(),
                status: dep.status,
            })
        })
    }

    fn topological_order(&self) -> KnowledgeResult<Vec<usize>> {
        for registration in &self.components {
            for dependency in &registration.spec.dependencies {
                if self.position(dependency).is_none() {
                    return Err(KnowledgeError::Configuration(format!(
                        "component '{}' depends on unregistered component '{dependency}'",
                        registration.spec.name
                    )));
                }
            }
        }

        let mut placed: HashSet<usize> = HashSet::new();
        let mut order = Vec::with_capacity(self.components.len());

        while order.len() < self.components.len() {
            let next = (0..self.components.len()).find(|idx| {
                !placed.contains(idx)
                    && self.components[*idx]
                        .spec
                        .dependencies
                        .iter()
                        .filter_map(|d| self.position(d))
                        .all(|d| placed.contains(&d))
            });

            match next {
                Some(idx) => {
                    placed.insert(idx);
                    order.push(idx);
                }
                None => return Err(KnowledgeError::DependencyCycle(self.find_cycle(&placed))),
            }
        }

        Ok(order)
    }

    /// Walk unplaced dependencies until a name repeats.
    fn find_cycle(&self, placed: &HashSet<usize>) -> Vec<String> {
        let Some(start) = (0..self.components.len()).find(|idx| !placed.contains(idx)) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;

        loop {
            let next = self.components[current]
                .spec
                .dependencies
                .iter()
                .filter_map(|d| self.position(d))
                .find(|d| !placed.contains(d));

            let Some(next) = next else { break };
            if let Some(&at) = seen.get(&next) {
                let mut cycle: Vec<String> = path[at..]
                    .iter()
                    .map(|i| self.components[*i].spec.name.clone())
                    .collect();
                cycle.push(self.components[next].spec.name.clone());
                return cycle;
            }
            seen.insert(next, path.len());
            path.push(next);
            current = next;
        }

        path.iter()
            .map(|i| self.components[*i].spec.name.clone())
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.spec.name == name)
    }

    fn state_of(&self, idx: usize) -> ComponentState {
        self.health()[idx].clone()
    }

    fn transition(&self, idx: usize, next: ComponentStatus, error: Option<String>) {
        self.publish(|states| {
            let state = &mut states[idx];
            if !state.status.can_transition_to(next) {
                warn!(
                    component = %state.name,
                    from = %state.status,
                    to = %next,
                    "Ignoring invalid lifecycle transition"
                );
                return;
            }
            state.status = next;
            if next == ComponentStatus::Initializing {
                state.retry_count = 0;
                state.error = None;
            }
            if error.is_some() {
                state.error = error;
            }
            state.updated_at = Utc::now();
        });
    }

    /// Copy, mutate, publish.
    fn publish(&self, mutate: impl FnOnce(&mut Vec<ComponentState>)) {
        let mut guard = match self.states.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = guard.as_ref().clone();
        mutate(&mut next);
        *guard = Arc::new(next);
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
