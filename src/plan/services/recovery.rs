//! Restart-time resolution of tasks left `in_progress` by a crash.
//!
//! An interrupted task may or may not have produced side effects, so it is
//! never resumed silently: it is marked failed and, under
//! [`RecoveryPolicy::Requeue`], put back in the queue through the normal
//! retry path.

use super::RunnerPolicy;
use crate::plan::{
    domain::{EventKind, PlanId, RetryApproval, Task, TaskId, TaskState},
    ports::{PlanStore, StoreError, StoreResult},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Error recorded on tasks interrupted by a restart.
pub const INTERRUPTED_ERROR: &str = "interrupted";

/// What to do with a task found `in_progress` at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Leave the task `failed` for an operator to retry.
    #[default]
    MarkFailed,
    /// Retry the task when it still has attempts left.
    Requeue,
}

impl RecoveryPolicy {
    /// Returns the configuration spelling of the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarkFailed => "mark_failed",
            Self::Requeue => "requeue",
        }
    }
}

impl fmt::Display for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown recovery policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown recovery policy: {0}")]
pub struct ParseRecoveryPolicyError(pub String);

impl TryFrom<&str> for RecoveryPolicy {
    type Error = ParseRecoveryPolicyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mark_failed" => Ok(Self::MarkFailed),
            "requeue" => Ok(Self::Requeue),
            _ => Err(ParseRecoveryPolicyError(value.to_owned())),
        }
    }
}

/// Resolution applied to one interrupted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The task was moved to `failed`.
    MarkedFailed,
    /// The task was moved to `failed` and then back to `pending`.
    Requeued,
    /// The owning plan is no longer open; the task was left untouched.
    SkippedPlanNotOpen,
    /// The task left `in_progress` before it could be recovered.
    SkippedChanged,
}

impl RecoveryAction {
    /// Returns the name written into `task_recovered` events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarkedFailed => "marked_failed",
            Self::Requeued => "requeued",
            Self::SkippedPlanNotOpen => "skipped_plan_not_open",
            Self::SkippedChanged => "skipped_changed",
        }
    }
}

/// One interrupted task and what recovery did with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredTask {
    /// Owning plan.
    pub plan_id: PlanId,
    /// Interrupted task.
    pub task_id: TaskId,
    /// Resolution applied.
    pub action: RecoveryAction,
}

/// Summary of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Every interrupted task found, in store order.
    pub tasks: Vec<RecoveredTask>,
}

impl RecoveryReport {
    /// Counts tasks resolved with `action`.
    #[must_use]
    pub fn count(&self, action: RecoveryAction) -> usize {
        self.tasks.iter().filter(|task| task.action == action).count()
    }

    /// Plans that received a requeued task and can be resumed.
    #[must_use]
    pub fn plans_to_resume(&self) -> Vec<PlanId> {
        let mut plans: Vec<PlanId> = self
            .tasks
            .iter()
            .filter(|task| task.action == RecoveryAction::Requeued)
            .map(|task| task.plan_id)
            .collect();
        plans.sort_unstable();
        plans.dedup();
        plans
    }
}

/// Resolves every task left `in_progress`.
///
/// `limits` supplies the attempt ceiling used by
/// [`RecoveryPolicy::Requeue`].
///
/// # Errors
///
/// Returns [`StoreError`] when the store fails; tasks resolved before the
/// failure stay resolved.
pub async fn recover_interrupted_tasks<S>(
    store: &S,
    policy: RecoveryPolicy,
    limits: RunnerPolicy,
) -> StoreResult<RecoveryReport>
where
    S: PlanStore + ?Sized,
{
    let interrupted = store.list_tasks_in_state(TaskState::InProgress).await?;
    let mut report = RecoveryReport::default();

    for task in interrupted {
        let plan_id = task.plan_id();
        let task_id = task.id();

        if !store.get_plan(plan_id).await?.is_open() {
            tracing::warn!(
                plan_id = %plan_id,
                task_id = %task_id,
                "interrupted task belongs to a plan that is no longer open"
            );
            report.tasks.push(RecoveredTask {
                plan_id,
                task_id,
                action: RecoveryAction::SkippedPlanNotOpen,
            });
            continue;
        }

        let failed = match store
            .set_task_state(task_id, TaskState::Failed, Some(INTERRUPTED_ERROR.to_owned()))
            .await
        {
            Ok(failed) => failed,
            Err(err) if err.is_invalid_transition() => {
                report.tasks.push(RecoveredTask {
                    plan_id,
                    task_id,
                    action: RecoveryAction::SkippedChanged,
                });
                continue;
            }
            Err(err) => return Err(err),
        };

        let action = resolve(store, policy, limits, &failed).await?;
        store
            .log_event(
                plan_id,
                Some(task_id),
                EventKind::TaskRecovered,
                json!({
                    "action": action.as_str(),
                    "policy": policy.as_str(),
                    "attempts": failed.attempts(),
                }),
            )
            .await?;
        tracing::warn!(
            plan_id = %plan_id,
            task_id = %task_id,
            action = action.as_str(),
            "recovered interrupted task"
        );
        report.tasks.push(RecoveredTask {
            plan_id,
            task_id,
            action,
        });
    }

    Ok(report)
}

async fn resolve<S>(
    store: &S,
    policy: RecoveryPolicy,
    limits: RunnerPolicy,
    task: &Task,
) -> StoreResult<RecoveryAction>
where
    S: PlanStore + ?Sized,
{
    if policy == RecoveryPolicy::MarkFailed || !limits.has_attempts_remaining(task) {
        return Ok(RecoveryAction::MarkedFailed);
    }
    match store.mark_retry(task.id(), RetryApproval::Unapproved).await {
        Ok(_) => Ok(RecoveryAction::Requeued),
        Err(err) if is_concurrent_change(&err) => Ok(RecoveryAction::MarkedFailed),
        Err(err) => Err(err),
    }
}

const fn is_concurrent_change(err: &StoreError) -> bool {
    err.is_invalid_transition() || err.is_invalid_state()
}
