//! External capabilities the orchestrator consumes: task execution, goal
//! decomposition and synthesis of finished work.

use crate::plan::domain::{AgentId, PlanId, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Output of a successful executor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Produced content.
    pub content: String,
    /// Self-reported confidence; clamped into `[0, 1]` when recorded.
    pub confidence: f64,
    /// Ordered citations backing the content.
    pub citations: Vec<String>,
}

impl ExecutionOutput {
    /// Creates an output without citations.
    #[must_use]
    pub fn new(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            confidence,
            citations: Vec::new(),
        }
    }

    /// Sets the citations.
    #[must_use]
    pub fn with_citations(mut self, citations: impl IntoIterator<Item = String>) -> Self {
        self.citations = citations.into_iter().collect();
        self
    }
}

/// Recoverable failure reported by an executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    /// Creates an execution error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message recorded as the task's `last_error`.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Runs one task on behalf of an agent.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes the task description for the given agent.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the work could not be produced; the
    /// runner applies its retry and escalation policy.
    async fn run(
        &self,
        agent: &AgentId,
        description: &str,
    ) -> Result<ExecutionOutput, ExecutionError>;
}

/// One entry of a decomposed goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Agent that should execute the task.
    pub agent: AgentId,
    /// What the agent should do.
    pub description: String,
}

impl TaskSpec {
    /// Creates a task specification.
    #[must_use]
    pub fn new(agent: AgentId, description: impl Into<String>) -> Self {
        Self {
            agent,
            description: description.into(),
        }
    }
}

/// Failure to break a goal into tasks.
#[derive(Debug, Clone, Error)]
pub enum DecompositionError {
    /// The goal could not be turned into a task list.
    #[error("decomposition rejected the goal: {0}")]
    Rejected(String),

    /// The decomposition backend failed.
    #[error("decomposition backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl DecompositionError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}

/// Breaks a goal into an ordered task list.
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Returns the tasks for `query` in execution order.
    ///
    /// # Errors
    ///
    /// Returns [`DecompositionError`] when no task list can be produced.
    async fn decompose(&self, query: &str) -> Result<Vec<TaskSpec>, DecompositionError>;
}

/// A completed task's output handed to synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTaskOutput {
    /// Completed task.
    pub task_id: TaskId,
    /// Agent that produced the output.
    pub agent: AgentId,
    /// Response content.
    pub content: String,
    /// Response confidence.
    pub confidence: f64,
    /// Response citations.
    pub citations: Vec<String>,
}

/// Final deliverable aggregated from completed outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    /// Executive summary.
    pub summary: String,
    /// Cross-cutting risks.
    pub risks: Vec<String>,
    /// Overall confidence.
    pub confidence: f64,
}

/// Failure to synthesise a plan; fatal to closure.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// The synthesiser produced output that could not be used.
    #[error("synthesis produced unusable output: {0}")]
    InvalidOutput(String),

    /// The synthesis backend failed.
    #[error("synthesis backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl SynthesisError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}

/// Aggregates completed task outputs into a final deliverable.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesises the plan from its completed outputs, in plan order.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError`] when no deliverable can be produced.
    async fn synthesize(
        &self,
        plan_id: PlanId,
        outputs: Vec<CompletedTaskOutput>,
    ) -> Result<Synthesis, SynthesisError>;
}
