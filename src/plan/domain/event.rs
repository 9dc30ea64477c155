//! Append-only audit events.
//!
//! Lifecycle events are built by the constructors on [`NewEvent`] and are
//! only written by the store operation that performs the matching change.
//! Annotation kinds describe orchestration milestones that do not change any
//! state and may be appended freely.

use super::{
    AgentResponse, EventId, ParseEventKindError, Plan, PlanDomainError, PlanId, Task, TaskId,
    TaskState,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Kind of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A plan was created.
    PlanCreated,
    /// A task was added to a plan.
    TaskCreated,
    /// A task changed state through `set_task_state`.
    TaskStateChanged,
    /// A recorded response completed a task.
    TaskCompletedOnResponse,
    /// A response arrived for a task that had already stopped; it was kept
    /// for audit without changing the task.
    TaskResponseRetained,
    /// A task was reset to pending for another attempt.
    TaskRetry,
    /// A task was cancelled.
    TaskCancelled,
    /// A plan was cancelled.
    PlanCancelled,
    /// A plan was closed.
    PlanClosed,
    /// Synthesis over completed outputs succeeded.
    SynthesisCompleted,
    /// Synthesis failed; the plan needs manual intervention.
    SynthesisFailed,
    /// The goal could not be broken into tasks.
    DecompositionFailed,
    /// A task interrupted by a crash was resolved on restart.
    TaskRecovered,
}

impl EventKind {
    const ALL: [Self; 13] = [
        Self::PlanCreated,
        Self::TaskCreated,
        Self::TaskStateChanged,
        Self::TaskCompletedOnResponse,
        Self::TaskResponseRetained,
        Self::TaskRetry,
        Self::TaskCancelled,
        Self::PlanCancelled,
        Self::PlanClosed,
        Self::SynthesisCompleted,
        Self::SynthesisFailed,
        Self::DecompositionFailed,
        Self::TaskRecovered,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlanCreated => "plan_created",
            Self::TaskCreated => "task_created",
            Self::TaskStateChanged => "task_state_changed",
            Self::TaskCompletedOnResponse => "task_completed_on_response",
            Self::TaskResponseRetained => "task_response_retained",
            Self::TaskRetry => "task_retry",
            Self::TaskCancelled => "task_cancelled",
            Self::PlanCancelled => "plan_cancelled",
            Self::PlanClosed => "plan_closed",
            Self::SynthesisCompleted => "synthesis_completed",
            Self::SynthesisFailed => "synthesis_failed",
            Self::DecompositionFailed => "decomposition_failed",
            Self::TaskRecovered => "task_recovered",
        }
    }

    /// Returns `true` for kinds owned by lifecycle operations.
    #[must_use]
    pub const fn is_lifecycle(self) -> bool {
        !matches!(
            self,
            Self::SynthesisCompleted
                | Self::SynthesisFailed
                | Self::DecompositionFailed
                | Self::TaskRecovered
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EventKind {
    type Error = ParseEventKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseEventKindError(value.to_owned()))
    }
}

/// An event that has been built but not yet given a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// Event identifier.
    pub id: EventId,
    /// Plan the event belongs to.
    pub plan_id: PlanId,
    /// Task the event concerns, if any.
    pub task_id: Option<TaskId>,
    /// Event kind.
    pub kind: EventKind,
    /// Kind-specific payload.
    pub payload: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    fn build(
        plan_id: PlanId,
        task_id: Option<TaskId>,
        kind: EventKind,
        payload: Value,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: EventId::new(),
            plan_id,
            task_id,
            kind,
            payload,
            created_at: clock.utc(),
        }
    }

    /// `plan_created`
    #[must_use]
    pub fn plan_created(plan: &Plan, clock: &impl Clock) -> Self {
        Self::build(
            plan.id(),
            None,
            EventKind::PlanCreated,
            json!({ "original_query": plan.original_query() }),
            clock,
        )
    }

    /// `task_created`
    #[must_use]
    pub fn task_created(task: &Task, clock: &impl Clock) -> Self {
        Self::build(
            task.plan_id(),
            Some(task.id()),
            EventKind::TaskCreated,
            json!({
                "agent": task.agent().as_str(),
                "position": task.position(),
            }),
            clock,
        )
    }

    /// `task_state_changed`
    #[must_use]
    pub fn task_state_changed(
        task: &Task,
        previous: TaskState,
        error: Option<&str>,
        clock: &impl Clock,
    ) -> Self {
        Self::build(
            task.plan_id(),
            Some(task.id()),
            EventKind::TaskStateChanged,
            json!({
                "previous": previous.as_str(),
                "next": task.state().as_str(),
                "error": error,
            }),
            clock,
        )
    }

    /// `task_completed_on_response`
    #[must_use]
    pub fn task_completed_on_response(
        task: &Task,
        response: &AgentResponse,
        clock: &impl Clock,
    ) -> Self {
        Self::build(
            task.plan_id(),
            Some(task.id()),
            EventKind::TaskCompletedOnResponse,
            response_payload(response),
            clock,
        )
    }

    /// `task_response_retained`
    #[must_use]
    pub fn task_response_retained(
        task: &Task,
        response: &AgentResponse,
        clock: &impl Clock,
    ) -> Self {
        let mut payload = response_payload(response);
        if let Value::Object(ref mut fields) = payload {
            fields.insert("state".to_owned(), Value::from(task.state().as_str()));
        }
        Self::build(
            task.plan_id(),
            Some(task.id()),
            EventKind::TaskResponseRetained,
            payload,
            clock,
        )
    }

    /// `task_retry`
    #[must_use]
    pub fn task_retry(task: &Task, previous: TaskState, clock: &impl Clock) -> Self {
        Self::build(
            task.plan_id(),
            Some(task.id()),
            EventKind::TaskRetry,
            json!({
                "previous": previous.as_str(),
                "attempts": task.attempts(),
            }),
            clock,
        )
    }

    /// `task_cancelled`
    #[must_use]
    pub fn task_cancelled(task: &Task, previous: TaskState, clock: &impl Clock) -> Self {
        Self::build(
            task.plan_id(),
            Some(task.id()),
            EventKind::TaskCancelled,
            json!({ "previous": previous.as_str() }),
            clock,
        )
    }

    /// `plan_cancelled`
    #[must_use]
    pub fn plan_cancelled(plan: &Plan, cancelled_tasks: usize, clock: &impl Clock) -> Self {
        Self::build(
            plan.id(),
            None,
            EventKind::PlanCancelled,
            json!({ "cancelled_tasks": cancelled_tasks }),
            clock,
        )
    }

    /// `plan_closed`
    #[must_use]
    pub fn plan_closed(plan: &Plan, clock: &impl Clock) -> Self {
        Self::build(plan.id(), None, EventKind::PlanClosed, json!({}), clock)
    }

    /// Builds an annotation event.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::ReservedEventKind`] for lifecycle kinds.
    pub fn annotation(
        plan_id: PlanId,
        task_id: Option<TaskId>,
        kind: EventKind,
        payload: Value,
        clock: &impl Clock,
    ) -> Result<Self, PlanDomainError> {
        if kind.is_lifecycle() {
            return Err(PlanDomainError::ReservedEventKind(kind.as_str().to_owned()));
        }
        Ok(Self::build(plan_id, task_id, kind, payload, clock))
    }
}

fn response_payload(response: &AgentResponse) -> Value {
    json!({
        "response_id": response.id().to_string(),
        "agent": response.agent().as_str(),
        "confidence": response.confidence().value(),
        "band": response.confidence().band().as_str(),
    })
}

/// A persisted, immutable audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    sequence: u64,
    id: EventId,
    plan_id: PlanId,
    task_id: Option<TaskId>,
    kind: EventKind,
    payload: Value,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Seals a new event with its store-assigned sequence number.
    #[must_use]
    pub fn from_new(event: NewEvent, sequence: u64) -> Self {
        Self {
            sequence,
            id: event.id,
            plan_id: event.plan_id,
            task_id: event.task_id,
            kind: event.kind,
            payload: event.payload,
            created_at: event.created_at,
        }
    }

    /// Returns the store-assigned sequence number.
    ///
    /// Sequence numbers increase strictly in append order and break ties
    /// between events sharing a timestamp.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the event identifier.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Returns the owning plan.
    #[must_use]
    pub const fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    /// Returns the task the event concerns, if any.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
