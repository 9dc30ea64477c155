//! Store port: durable persistence and the single point of lifecycle
//! mutation for plans and tasks.

use crate::plan::domain::{
    AgentId, AgentResponse, Event, EventKind, NewAgentResponse, Plan, PlanDomainError, PlanId,
    PlanStatus, RecordedResponse, RetryApproval, Task, TaskId, TaskState,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Default number of events returned by [`EventQuery`].
pub const DEFAULT_EVENT_LIMIT: usize = 200;

/// Largest number of events a single query may return.
pub const MAX_EVENT_LIMIT: usize = 1000;

/// Filter for listing a plan's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    plan_id: PlanId,
    task_id: Option<TaskId>,
    limit: usize,
}

impl EventQuery {
    /// Queries the most recent events of a plan.
    #[must_use]
    pub const fn for_plan(plan_id: PlanId) -> Self {
        Self {
            plan_id,
            task_id: None,
            limit: DEFAULT_EVENT_LIMIT,
        }
    }

    /// Restricts the query to one task.
    #[must_use]
    pub const fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Sets the limit, clamped to `1..=MAX_EVENT_LIMIT`.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_EVENT_LIMIT);
        self
    }

    /// Returns the plan filter.
    #[must_use]
    pub const fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    /// Returns the optional task filter.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Returns the effective limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns `true` when `event` passes the plan and task filters.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        event.plan_id() == self.plan_id
            && self.task_id.is_none_or(|task_id| event.task_id() == Some(task_id))
    }
}

/// Outcome of cancelling a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCancellation {
    /// The plan in its cancelled state.
    pub plan: Plan,
    /// Tasks that were moved to `cancelled`, in plan order.
    pub cancelled_tasks: Vec<TaskId>,
}

/// Durable plan and task store.
///
/// Implementations apply every lifecycle rule through the domain
/// aggregates, write exactly one event per state or status change, and make
/// each operation atomic: a failed operation leaves no partial writes.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Creates an open plan and emits `plan_created`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Domain`] for a blank query.
    async fn create_plan(&self, query: &str) -> StoreResult<Plan>;

    /// Fetches a plan.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PlanNotFound`] when the plan does not exist.
    async fn get_plan(&self, plan_id: PlanId) -> StoreResult<Plan>;

    /// Lists plans oldest first, optionally filtered by status.
    async fn list_plans(&self, status: Option<PlanStatus>) -> StoreResult<Vec<Plan>>;

    /// Appends a pending task to an open plan and emits `task_created`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PlanNotFound`] when the plan is missing and
    /// [`StoreError::Domain`] when it is not open or the description is
    /// blank.
    async fn add_task(
        &self,
        plan_id: PlanId,
        agent: &AgentId,
        description: &str,
    ) -> StoreResult<Task>;

    /// Fetches a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] when the task does not exist.
    async fn get_task(&self, task_id: TaskId) -> StoreResult<Task>;

    /// Lists a plan's tasks in plan order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PlanNotFound`] when the plan does not exist.
    async fn list_plan_tasks(&self, plan_id: PlanId) -> StoreResult<Vec<Task>>;

    /// Lists tasks in the given state across all plans.
    async fn list_tasks_in_state(&self, state: TaskState) -> StoreResult<Vec<Task>>;

    /// Applies a guarded state change and emits `task_state_changed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or an invalid-transition
    /// [`StoreError::Domain`] error; a rejected change writes nothing.
    async fn set_task_state(
        &self,
        task_id: TaskId,
        state: TaskState,
        error: Option<String>,
    ) -> StoreResult<Task>;

    /// Persists a response and completes the task when it is `in_progress`.
    ///
    /// Emits `task_completed_on_response` when the task completes and
    /// `task_response_retained` when it had already failed, escalated or
    /// been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or an invalid-transition
    /// [`StoreError::Domain`] error for `pending` and `completed` tasks, in
    /// which case the response is not stored.
    async fn record_agent_response(
        &self,
        response: NewAgentResponse,
    ) -> StoreResult<RecordedResponse>;

    /// Lists every response recorded for a plan's tasks in recording order.
    ///
    /// The response that completed a task is the last one listed for it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PlanNotFound`] when the plan does not exist.
    async fn list_plan_responses(&self, plan_id: PlanId) -> StoreResult<Vec<AgentResponse>>;

    /// Resets a failed, escalated or cancelled task to `pending`, increments
    /// its attempts, clears its error and emits `task_retry`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`], an invalid-transition
    /// [`StoreError::Domain`] error (including a missing escalation
    /// approval) or an invalid-state error when the plan is not open.
    async fn mark_retry(&self, task_id: TaskId, approval: RetryApproval) -> StoreResult<Task>;

    /// Cancels a pending or in-progress task and emits `task_cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or an invalid-transition
    /// [`StoreError::Domain`] error.
    async fn cancel_task(&self, task_id: TaskId) -> StoreResult<Task>;

    /// Cancels an open plan together with all of its pending and
    /// in-progress tasks in one atomic unit, emitting `plan_cancelled` and
    /// one `task_cancelled` per affected task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PlanNotFound`] or an invalid-state
    /// [`StoreError::Domain`] error when the plan is not open.
    async fn cancel_plan(&self, plan_id: PlanId) -> StoreResult<PlanCancellation>;

    /// Closes an open plan whose tasks are all terminal and emits
    /// `plan_closed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PlanNotFound`] or an invalid-state
    /// [`StoreError::Domain`] error.
    async fn close_plan(&self, plan_id: PlanId) -> StoreResult<Plan>;

    /// Appends an annotation event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PlanNotFound`] when the plan does not exist,
    /// [`StoreError::TaskNotFound`] when the task is missing or belongs to
    /// another plan, and an invalid-state [`StoreError::Domain`] error for
    /// lifecycle kinds.
    async fn log_event(
        &self,
        plan_id: PlanId,
        task_id: Option<TaskId>,
        kind: EventKind,
        payload: Value,
    ) -> StoreResult<Event>;

    /// Lists events matching the query in chronological order.
    ///
    /// When more events match than the limit allows, the most recent ones
    /// are returned.
    async fn list_events(&self, query: EventQuery) -> StoreResult<Vec<Event>>;
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The plan was not found.
    #[error("plan not found: {0}")]
    PlanNotFound(PlanId),

    /// The task was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// A lifecycle rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] PlanDomainError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Returns `true` for a missing plan or task.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PlanNotFound(_) | Self::TaskNotFound(_))
    }

    /// Returns `true` when a state machine guard rejected the operation.
    #[must_use]
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::Domain(err) if err.is_invalid_transition())
    }

    /// Returns `true` when an operation's plan precondition failed.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Domain(err) if err.is_invalid_state())
    }
}
