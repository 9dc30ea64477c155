//! Plan aggregate root.

use super::{PlanDomainError, PlanId, PlanStatus, Task};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// A unit of work derived from one submitted goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    id: PlanId,
    original_query: String,
    status: PlanStatus,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPlanData {
    /// Persisted plan identifier.
    pub id: PlanId,
    /// Goal the plan was created from.
    pub original_query: String,
    /// Persisted status.
    pub status: PlanStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the plan left the open status, if it has.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Plan {
    /// Creates an open plan for the given goal.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::EmptyQuery`] when the query is blank.
    pub fn new(
        original_query: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<Self, PlanDomainError> {
        let raw = original_query.into();
        if raw.trim().is_empty() {
            return Err(PlanDomainError::EmptyQuery);
        }
        Ok(Self {
            id: PlanId::new(),
            original_query: raw,
            status: PlanStatus::Open,
            created_at: clock.utc(),
            closed_at: None,
        })
    }

    /// Reconstructs a plan from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedPlanData) -> Self {
        Self {
            id: data.id,
            original_query: data.original_query,
            status: data.status,
            created_at: data.created_at,
            closed_at: data.closed_at,
        }
    }

    /// Returns the plan identifier.
    #[must_use]
    pub const fn id(&self) -> PlanId {
        self.id
    }

    /// Returns the goal the plan was created from.
    #[must_use]
    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    /// Returns the plan status.
    #[must_use]
    pub const fn status(&self) -> PlanStatus {
        self.status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the plan was closed or cancelled.
    #[must_use]
    pub const fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Returns `true` while the plan is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PlanStatus::Open
    }

    /// Fails unless the plan is open.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::PlanNotOpen`] for closed or cancelled plans.
    pub fn ensure_open(&self) -> Result<(), PlanDomainError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PlanDomainError::PlanNotOpen {
                plan_id: self.id,
                status: self.status,
            })
        }
    }

    /// Marks the plan cancelled.
    ///
    /// Cancelling the plan's tasks is the caller's job and must happen in
    /// the same atomic unit.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::PlanNotOpen`] when the plan is not open.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<(), PlanDomainError> {
        self.ensure_open()?;
        self.status = PlanStatus::Cancelled;
        self.closed_at = Some(clock.utc());
        Ok(())
    }

    /// Closes the plan once every task is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::PlanNotOpen`] when the plan is not open and
    /// [`PlanDomainError::NonTerminalTasks`] when any task is unfinished.
    pub fn close(&mut self, tasks: &[Task], clock: &impl Clock) -> Result<(), PlanDomainError> {
        self.ensure_open()?;
        let remaining = tasks
            .iter()
            .filter(|task| !task.state().is_terminal())
            .count();
        if remaining > 0 {
            return Err(PlanDomainError::NonTerminalTasks {
                plan_id: self.id,
                remaining,
            });
        }
        self.status = PlanStatus::Closed;
        self.closed_at = Some(clock.utc());
        Ok(())
    }
}
