//! Plan controller: submission, cancellation, retry and inspection.
//!
//! The controller is a thin coordinator. Every mutation goes through the
//! store; runs execute as background tokio tasks whose handles are tracked
//! per plan so callers can await them.

use super::{OrchestratorRunner, RunReport, RunnerError, RunnerResult};
use crate::plan::{
    domain::{Event, EventKind, Plan, PlanId, RetryApproval, Task, TaskId},
    ports::{
        DecompositionError, Decomposer, EventQuery, PlanCancellation, PlanStore, StoreError,
    },
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A plan together with its tasks in plan order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    /// The plan.
    pub plan: Plan,
    /// Its tasks.
    pub tasks: Vec<Task>,
}

/// Errors returned by controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A store operation failed or was rejected.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The goal could not be decomposed; the plan was cancelled.
    #[error("decomposition failed for plan {plan_id}: {source}")]
    Decomposition {
        /// Plan cancelled because of the failure.
        plan_id: PlanId,
        /// Underlying decomposition failure.
        #[source]
        source: DecompositionError,
    },

    /// A background run failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// No run is tracked for the plan.
    #[error("no run is tracked for plan {0}")]
    RunNotTracked(PlanId),

    /// A run for the plan is still in progress.
    #[error("a run for plan {0} is still active")]
    RunActive(PlanId),

    /// The background run panicked or was aborted.
    #[error("run task for plan {plan_id} did not complete: {source}")]
    Join {
        /// Plan whose run was lost.
        plan_id: PlanId,
        /// Join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ControllerError {
    /// Returns `true` for missing plans, tasks or runs.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Store(err) => err.is_not_found(),
            Self::RunNotTracked(_) => true,
            _ => false,
        }
    }

    /// Returns `true` when a state machine guard rejected the operation.
    #[must_use]
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_invalid_transition())
    }

    /// Returns `true` when the plan was not in a state that allows the
    /// operation.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        match self {
            Self::Store(err) => err.is_invalid_state(),
            Self::RunActive(_) => true,
            _ => false,
        }
    }
}

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

type RunHandle = JoinHandle<RunnerResult<RunReport>>;

/// Entry point for plan submission and management.
pub struct PlanController<S> {
    store: Arc<S>,
    runner: OrchestratorRunner<S>,
    decomposer: Arc<dyn Decomposer>,
    runs: Arc<Mutex<HashMap<PlanId, RunHandle>>>,
}

impl<S> Clone for PlanController<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            runner: self.runner.clone(),
            decomposer: Arc::clone(&self.decomposer),
            runs: Arc::clone(&self.runs),
        }
    }
}

impl<S> PlanController<S>
where
    S: PlanStore + 'static,
{
    /// Creates a controller.
    ///
    /// `decomposer` is used by [`Self::create_and_run`]; [`Self::submit`]
    /// accepts any decomposer per call.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        runner: OrchestratorRunner<S>,
        decomposer: Arc<dyn Decomposer>,
    ) -> Self {
        Self {
            store,
            runner,
            decomposer,
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a plan for `query`, persists the decomposed tasks and starts
    /// a background run. Returns without waiting for the run.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Decomposition`] when the decomposer fails
    /// (the plan is cancelled and a `decomposition_failed` event logged), or
    /// [`ControllerError::Store`] when persistence fails.
    pub async fn submit(
        &self,
        query: &str,
        decomposer: &dyn Decomposer,
    ) -> ControllerResult<PlanId> {
        let plan = self.store.create_plan(query).await?;
        let plan_id = plan.id();
        tracing::info!(plan_id = %plan_id, "plan submitted");

        let specs = match decomposer.decompose(plan.original_query()).await {
            Ok(specs) => specs,
            Err(source) => {
                tracing::error!(plan_id = %plan_id, error = %source, "decomposition failed");
                self.store.cancel_plan(plan_id).await?;
                self.store
                    .log_event(
                        plan_id,
                        None,
                        EventKind::DecompositionFailed,
                        json!({ "error": source.to_string() }),
                    )
                    .await?;
                return Err(ControllerError::Decomposition { plan_id, source });
            }
        };

        for spec in &specs {
            self.store
                .add_task(plan_id, &spec.agent, &spec.description)
                .await?;
        }
        tracing::info!(plan_id = %plan_id, tasks = specs.len(), "plan decomposed");

        self.spawn_run(plan_id).await?;
        Ok(plan_id)
    }

    /// [`Self::submit`] with the controller's own decomposer.
    ///
    /// # Errors
    ///
    /// See [`Self::submit`].
    pub async fn create_and_run(&self, query: &str) -> ControllerResult<PlanId> {
        let decomposer = Arc::clone(&self.decomposer);
        self.submit(query, decomposer.as_ref()).await
    }

    /// Cancels the plan and its unfinished tasks. A run in flight stops
    /// before its next dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the plan is missing or not
    /// open.
    pub async fn cancel(&self, plan_id: PlanId) -> ControllerResult<PlanCancellation> {
        let cancellation = self.store.cancel_plan(plan_id).await?;
        tracing::info!(
            plan_id = %plan_id,
            cancelled_tasks = cancellation.cancelled_tasks.len(),
            "plan cancelled"
        );
        Ok(cancellation)
    }

    /// Cancels a single pending or in-progress task.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the task is missing or cannot
    /// be cancelled from its current state.
    pub async fn cancel_task(&self, task_id: TaskId) -> ControllerResult<Task> {
        Ok(self.store.cancel_task(task_id).await?)
    }

    /// Moves a failed, escalated or cancelled task back to `pending`.
    ///
    /// Escalated tasks need [`RetryApproval::Approved`]. The task runs on
    /// the next [`Self::resume`].
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the task is missing, the retry
    /// is not permitted or the plan is not open.
    pub async fn retry_task(
        &self,
        task_id: TaskId,
        approval: RetryApproval,
    ) -> ControllerResult<Task> {
        Ok(self.store.mark_retry(task_id, approval).await?)
    }

    /// Returns the plan with its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the plan is missing.
    pub async fn inspect(&self, plan_id: PlanId) -> ControllerResult<PlanSnapshot> {
        let plan = self.store.get_plan(plan_id).await?;
        let tasks = self.store.list_plan_tasks(plan_id).await?;
        Ok(PlanSnapshot { plan, tasks })
    }

    /// Returns the plan's events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the lookup fails.
    pub async fn events(&self, query: EventQuery) -> ControllerResult<Vec<Event>> {
        Ok(self.store.list_events(query).await?)
    }

    /// Starts a new run for an open plan, typically after manual retries or
    /// crash recovery.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the plan is missing or not
    /// open, and [`ControllerError::RunActive`] when a run is still going.
    pub async fn resume(&self, plan_id: PlanId) -> ControllerResult<()> {
        self.store
            .get_plan(plan_id)
            .await?
            .ensure_open()
            .map_err(StoreError::from)?;
        self.spawn_run(plan_id).await
    }

    /// Returns `true` while a tracked run for the plan has not finished.
    pub async fn is_running(&self, plan_id: PlanId) -> bool {
        self.runs
            .lock()
            .await
            .get(&plan_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Waits for the tracked run of `plan_id` and returns its report.
    ///
    /// A finished run stays tracked only until the controller starts its
    /// next run; after that its outcome is read from the store.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::RunNotTracked`] when no run is tracked,
    /// [`ControllerError::Runner`] when the run failed and
    /// [`ControllerError::Join`] when it panicked.
    pub async fn wait(&self, plan_id: PlanId) -> ControllerResult<RunReport> {
        let handle = self
            .runs
            .lock()
            .await
            .remove(&plan_id)
            .ok_or(ControllerError::RunNotTracked(plan_id))?;
        let report = handle
            .await
            .map_err(|source| ControllerError::Join { plan_id, source })??;
        Ok(report)
    }

    async fn spawn_run(&self, plan_id: PlanId) -> ControllerResult<()> {
        let mut runs = self.runs.lock().await;
        if runs.get(&plan_id).is_some_and(|handle| !handle.is_finished()) {
            return Err(ControllerError::RunActive(plan_id));
        }
        runs.retain(|_, handle| !handle.is_finished());
        let runner = self.runner.clone();
        let handle = tokio::spawn(async move { runner.run(plan_id).await });
        runs.insert(plan_id, handle);
        Ok(())
    }
}
