//! Explicit mapping from agent identifiers to task executors.

use crate::plan::{domain::AgentId, ports::TaskExecutor};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Executors keyed by the agent they serve.
///
/// The runner escalates any task whose agent has no entry here.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<AgentId, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `executor` for `agent`, replacing any previous entry.
    pub fn register(&mut self, agent: AgentId, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(agent, executor);
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with_executor(mut self, agent: AgentId, executor: Arc<dyn TaskExecutor>) -> Self {
        self.register(agent, executor);
        self
    }

    /// Returns the executor for `agent`, if one is registered.
    #[must_use]
    pub fn get(&self, agent: &AgentId) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(agent).cloned()
    }

    /// Returns `true` when `agent` has an executor.
    #[must_use]
    pub fn contains(&self, agent: &AgentId) -> bool {
        self.executors.contains_key(agent)
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Returns `true` when no executor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut agents: Vec<&str> = self.executors.keys().map(AgentId::as_str).collect();
        agents.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("agents", &agents)
            .finish()
    }
}
