//! Error types for plan and task lifecycle rules.

use super::{PlanId, PlanStatus, TaskId, TaskState};
use thiserror::Error;

/// Errors raised when a lifecycle rule or value constraint is violated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanDomainError {
    /// The requested task state transition is not permitted.
    #[error("invalid task state transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Current state.
        from: TaskState,
        /// Requested state.
        to: TaskState,
    },

    /// An escalated task can only be retried with explicit approval.
    #[error("task {0} is escalated; retry requires explicit approval")]
    EscalationApprovalRequired(TaskId),

    /// The plan is no longer open.
    #[error("plan {plan_id} is {status}, expected open")]
    PlanNotOpen {
        /// Plan identifier.
        plan_id: PlanId,
        /// Current plan status.
        status: PlanStatus,
    },

    /// The plan still has tasks that have not reached a terminal state.
    #[error("plan {plan_id} has {remaining} non-terminal task(s)")]
    NonTerminalTasks {
        /// Plan identifier.
        plan_id: PlanId,
        /// Number of tasks that are not terminal.
        remaining: usize,
    },

    /// Lifecycle event kinds can only be written by lifecycle operations.
    #[error("event kind '{0}' is reserved for lifecycle operations")]
    ReservedEventKind(String),

    /// The original query of a plan is blank.
    #[error("plan query must not be empty")]
    EmptyQuery,

    /// The agent identifier is blank.
    #[error("agent identifier must not be empty")]
    EmptyAgentId,

    /// The task description is blank.
    #[error("task description must not be empty")]
    EmptyDescription,

    /// A confidence score was NaN or infinite.
    #[error("confidence must be a finite number")]
    NonFiniteConfidence,
}

impl PlanDomainError {
    /// Returns `true` when a state machine guard rejected the operation.
    #[must_use]
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::EscalationApprovalRequired(_)
        )
    }

    /// Returns `true` when an operation's precondition on plan state failed.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Self::PlanNotOpen { .. } | Self::NonTerminalTasks { .. } | Self::ReservedEventKind(_)
        )
    }
}

/// Error returned while parsing task states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task state: {0}")]
pub struct ParseTaskStateError(pub String);

/// Error returned while parsing plan statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown plan status: {0}")]
pub struct ParsePlanStatusError(pub String);

/// Error returned while parsing event kinds from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown event kind: {0}")]
pub struct ParseEventKindError(pub String);
