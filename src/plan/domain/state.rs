//! Task and plan lifecycle states and the task transition table.

use super::{ParsePlanStatusError, ParseTaskStateError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle state.
///
/// Allowed transitions:
///
/// | From | To |
/// |---|---|
/// | `pending` | `in_progress`, `cancelled` |
/// | `in_progress` | `completed`, `failed`, `escalated`, `cancelled` |
/// | `failed`, `escalated`, `cancelled` | `pending` (retry) |
///
/// `completed` has no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Task is waiting to be dispatched.
    Pending,
    /// Task has been dispatched to an executor.
    InProgress,
    /// Task finished with a recorded response.
    Completed,
    /// The last attempt failed.
    Failed,
    /// The task needs external approval before it can be retried.
    Escalated,
    /// Task was cancelled manually or by its plan.
    Cancelled,
}

impl TaskState {
    /// Every task state, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
        Self::Escalated,
        Self::Cancelled,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` when the transition `self -> next` is in the table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress | Self::Cancelled)
                | (
                    Self::InProgress,
                    Self::Completed | Self::Failed | Self::Escalated | Self::Cancelled
                )
                | (Self::Failed | Self::Escalated | Self::Cancelled, Self::Pending)
        )
    }

    /// Returns `true` for states that count as finished for plan closure.
    ///
    /// A cancelled task is terminal until someone retries it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns `true` for states a retry may start from.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Failed | Self::Escalated | Self::Cancelled)
    }

    /// Returns `true` for states a cancel may start from.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskState {
    type Error = ParseTaskStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseTaskStateError(value.to_owned()))
    }
}

/// Plan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Plan accepts tasks and runs.
    Open,
    /// Every task finished and the plan was synthesised.
    Closed,
    /// Plan was cancelled together with its unfinished tasks.
    Cancelled,
}

impl PlanStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PlanStatus {
    type Error = ParsePlanStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParsePlanStatusError(value.to_owned())),
        }
    }
}
