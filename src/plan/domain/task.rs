//! Task aggregate and its guarded lifecycle operations.

use super::{AgentId, PlanDomainError, PlanId, ResponseDisposition, TaskId, TaskState};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Whether a retry of an escalated task has been approved.
///
/// Retries from `failed` and `cancelled` ignore this flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryApproval {
    /// No explicit approval was given.
    #[default]
    Unapproved,
    /// An operator approved retrying an escalated task.
    Approved,
}

/// One unit of delegated work owned by a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    plan_id: PlanId,
    agent: AgentId,
    description: String,
    position: u32,
    state: TaskState,
    attempts: u32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Owning plan.
    pub plan_id: PlanId,
    /// Agent the task is assigned to.
    pub agent: AgentId,
    /// Task description handed to the executor.
    pub description: String,
    /// Zero-based position within the plan.
    pub position: u32,
    /// Persisted lifecycle state.
    pub state: TaskState,
    /// Number of retries performed so far.
    pub attempts: u32,
    /// Error captured by the last failure, if any.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest lifecycle timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task with zero attempts.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::EmptyDescription`] when the description is
    /// blank.
    pub fn new(
        plan_id: PlanId,
        agent: AgentId,
        description: impl Into<String>,
        position: u32,
        clock: &impl Clock,
    ) -> Result<Self, PlanDomainError> {
        let raw = description.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PlanDomainError::EmptyDescription);
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: TaskId::new(),
            plan_id,
            agent,
            description: trimmed.to_owned(),
            position,
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            plan_id: data.plan_id,
            agent: data.agent,
            description: data.description,
            position: data.position,
            state: data.state,
            attempts: data.attempts,
            last_error: data.last_error,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning plan identifier.
    #[must_use]
    pub const fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    /// Returns the agent the task is assigned to.
    #[must_use]
    pub const fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// Returns the task description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the zero-based position within the plan.
    #[must_use]
    pub const fn position(&self) -> u32 {
        self.position
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Returns how many retries have been performed.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the error captured by the last failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest lifecycle timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Applies a state change requested through `set_task_state`.
    ///
    /// `completed` and `pending` are only reachable through
    /// [`Task::accept_response`] and [`Task::retry`], so they are rejected
    /// here even where the table would allow them. A supplied `error`
    /// replaces `last_error`. Returns the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::InvalidTransition`] and leaves the task
    /// unchanged when the transition is not permitted.
    pub fn apply_state(
        &mut self,
        next: TaskState,
        error: Option<String>,
        clock: &impl Clock,
    ) -> Result<TaskState, PlanDomainError> {
        if matches!(next, TaskState::Completed | TaskState::Pending) {
            return Err(self.invalid_transition(next));
        }
        let previous = self.transition_to(next, clock)?;
        if error.is_some() {
            self.last_error = error;
        }
        Ok(previous)
    }

    /// Decides what a newly recorded response does to this task.
    ///
    /// An `in_progress` task completes. Responses arriving after the task
    /// failed, was escalated, or was cancelled are kept for audit only and
    /// leave the state alone.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::InvalidTransition`] for `pending` tasks,
    /// which were never dispatched, and `completed` tasks, which already
    /// have their counting response.
    pub fn accept_response(
        &mut self,
        clock: &impl Clock,
    ) -> Result<ResponseDisposition, PlanDomainError> {
        match self.state {
            TaskState::InProgress => {
                self.transition_to(TaskState::Completed, clock)?;
                Ok(ResponseDisposition::Completed)
            }
            TaskState::Failed | TaskState::Escalated | TaskState::Cancelled => {
                Ok(ResponseDisposition::Retained { state: self.state })
            }
            TaskState::Pending | TaskState::Completed => {
                Err(self.invalid_transition(TaskState::Completed))
            }
        }
    }

    /// Resets the task to `pending` for another attempt.
    ///
    /// Increments `attempts` and clears `last_error`. Returns the previous
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::EscalationApprovalRequired`] when retrying
    /// an escalated task without approval and
    /// [`PlanDomainError::InvalidTransition`] from any non-retryable state.
    pub fn retry(
        &mut self,
        approval: RetryApproval,
        clock: &impl Clock,
    ) -> Result<TaskState, PlanDomainError> {
        if self.state == TaskState::Escalated && approval != RetryApproval::Approved {
            return Err(PlanDomainError::EscalationApprovalRequired(self.id));
        }
        let previous = self.transition_to(TaskState::Pending, clock)?;
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = None;
        Ok(previous)
    }

    /// Cancels a pending or in-progress task. Returns the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::InvalidTransition`] from any other state,
    /// including an already cancelled task.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<TaskState, PlanDomainError> {
        self.transition_to(TaskState::Cancelled, clock)
    }

    fn transition_to(
        &mut self,
        next: TaskState,
        clock: &impl Clock,
    ) -> Result<TaskState, PlanDomainError> {
        if !self.state.can_transition_to(next) {
            return Err(self.invalid_transition(next));
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = clock.utc();
        Ok(previous)
    }

    const fn invalid_transition(&self, to: TaskState) -> PlanDomainError {
        PlanDomainError::InvalidTransition {
            task_id: self.id,
            from: self.state,
            to,
        }
    }
}
