//! Shared world state for plan lifecycle BDD scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use planwright::plan::{
    adapters::memory::InMemoryPlanStore,
    domain::{AgentId, Plan, PlanId, Task},
    ports::{
        CompletedTaskOutput, ExecutionError, ExecutionOutput, PlanCancellation, Synthesis,
        SynthesisError, Synthesizer, TaskExecutor,
    },
    services::{ExecutorRegistry, RunReport},
};
use rstest::fixture;

/// Executor that fails every call with the same message.
#[derive(Debug)]
pub struct FailingExecutor {
    pub message: String,
    pub calls: AtomicUsize,
}

impl FailingExecutor {
    /// Creates an executor failing with `message`.
    #[must_use]
    pub const fn new(message: String) -> Self {
        Self {
            message,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for FailingExecutor {
    async fn run(
        &self,
        _agent: &AgentId,
        _description: &str,
    ) -> Result<ExecutionOutput, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExecutionError::new(self.message.clone()))
    }
}

/// Synthesiser that concatenates completed outputs.
#[derive(Debug, Default)]
pub struct ConcatSynthesizer;

#[async_trait]
impl Synthesizer for ConcatSynthesizer {
    async fn synthesize(
        &self,
        _plan_id: PlanId,
        outputs: Vec<CompletedTaskOutput>,
    ) -> Result<Synthesis, SynthesisError> {
        Ok(Synthesis {
            summary: outputs
                .iter()
                .map(|output| output.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            risks: Vec::new(),
            confidence: 0.9,
        })
    }
}

/// Scenario world for plan lifecycle behaviour tests.
pub struct PlanWorld {
    pub store: Arc<InMemoryPlanStore>,
    pub plan: Option<Plan>,
    pub tasks: Vec<Task>,
    pub executors: ExecutorRegistry,
    pub failing: Option<Arc<FailingExecutor>>,
    pub report: Option<RunReport>,
    pub cancellation: Option<PlanCancellation>,
    pub events_before_cancel: usize,
}

impl PlanWorld {
    /// Creates a world backed by an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryPlanStore::new()),
            plan: None,
            tasks: Vec::new(),
            executors: ExecutorRegistry::new(),
            failing: None,
            report: None,
            cancellation: None,
            events_before_cancel: 0,
        }
    }

    /// Returns the scenario's plan.
    ///
    /// # Errors
    ///
    /// Returns an error when no plan has been created yet.
    pub fn plan(&self) -> Result<&Plan, eyre::Report> {
        self.plan
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing plan in scenario world"))
    }

    /// Returns the most recently added task.
    ///
    /// # Errors
    ///
    /// Returns an error when no task has been added yet.
    pub fn latest_task(&self) -> Result<&Task, eyre::Report> {
        self.tasks
            .last()
            .ok_or_else(|| eyre::eyre!("missing task in scenario world"))
    }

    /// Replaces the tracked copy of `task`.
    pub fn remember(&mut self, task: Task) {
        if let Some(slot) = self.tasks.iter_mut().find(|known| known.id() == task.id()) {
            *slot = task;
        } else {
            self.tasks.push(task);
        }
    }
}

impl Default for PlanWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> PlanWorld {
    PlanWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
