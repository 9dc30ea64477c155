//! Orchestrator runner: drives one plan's tasks to a resolution.
//!
//! Tasks run sequentially in plan order. Before every dispatch the runner
//! re-reads the plan and the task, so cancellation committed by another
//! caller stops further dispatching without interrupting an executor call
//! already in flight.

use super::{ExecutorRegistry, RunnerPolicy};
use crate::plan::{
    domain::{
        AgentResponse, Confidence, ConfidenceBand, EventKind, NewAgentResponse, PlanId,
        ResponseDisposition, RetryApproval, Task, TaskId, TaskState,
    },
    ports::{
        CompletedTaskOutput, ExecutionOutput, PlanStore, StoreError, Synthesis, SynthesisError,
        Synthesizer,
    },
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task reached a terminal state, synthesis succeeded and the
    /// plan was closed.
    Closed,
    /// At least one task ended failed, escalated or otherwise unresolved;
    /// the plan stays open for manual intervention.
    AwaitingIntervention,
    /// The plan left `open` while the run was in progress.
    Cancelled,
}

impl RunOutcome {
    /// Returns the canonical name of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::AwaitingIntervention => "awaiting_intervention",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Plan that was run.
    pub plan_id: PlanId,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Task snapshot taken when the run ended, in plan order.
    pub tasks: Vec<Task>,
    /// Synthesis result, present only for [`RunOutcome::Closed`].
    pub synthesis: Option<Synthesis>,
}

impl RunReport {
    /// Counts the tasks that ended in `state`.
    #[must_use]
    pub fn count_in(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|task| task.state() == state).count()
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The store failed; the last committed state stands.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Synthesis failed; the plan stays open until someone intervenes.
    #[error("synthesis failed for plan {plan_id}: {source}")]
    Synthesis {
        /// Plan left open.
        plan_id: PlanId,
        /// Underlying synthesis failure.
        #[source]
        source: SynthesisError,
    },
}

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// What to do with the current task after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Settled,
    Retry,
}

/// Drives plans through execution, retry, escalation and synthesis.
pub struct OrchestratorRunner<S> {
    store: Arc<S>,
    executors: Arc<ExecutorRegistry>,
    synthesizer: Arc<dyn Synthesizer>,
    policy: RunnerPolicy,
}

impl<S> Clone for OrchestratorRunner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            executors: Arc::clone(&self.executors),
            synthesizer: Arc::clone(&self.synthesizer),
            policy: self.policy,
        }
    }
}

impl<S> OrchestratorRunner<S>
where
    S: PlanStore + 'static,
{
    /// Creates a runner with the default policy.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        executors: Arc<ExecutorRegistry>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            store,
            executors,
            synthesizer,
            policy: RunnerPolicy::default(),
        }
    }

    /// Replaces the retry and timeout policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RunnerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the policy in force.
    #[must_use]
    pub const fn policy(&self) -> RunnerPolicy {
        self.policy
    }

    /// Runs every pending task of `plan_id`, then synthesises and closes
    /// the plan when all tasks are terminal.
    ///
    /// Executor failures are absorbed by the retry and escalation policy
    /// and never surface here.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Store`] when persistence fails or the plan does
    /// not exist, and [`RunnerError::Synthesis`] when synthesis fails.
    pub async fn run(&self, plan_id: PlanId) -> RunnerResult<RunReport> {
        tracing::info!(plan_id = %plan_id, "plan run started");
        let mut visited = HashSet::new();

        loop {
            let next = self
                .store
                .list_plan_tasks(plan_id)
                .await?
                .into_iter()
                .find(|task| task.state() == TaskState::Pending && !visited.contains(&task.id()));
            let Some(task) = next else { break };
            visited.insert(task.id());

            if !self.drive_task(plan_id, task.id()).await? {
                return self.finish(plan_id, RunOutcome::Cancelled, None).await;
            }
        }

        if !self.store.get_plan(plan_id).await?.is_open() {
            return self.finish(plan_id, RunOutcome::Cancelled, None).await;
        }

        let tasks = self.store.list_plan_tasks(plan_id).await?;
        let unresolved = tasks.iter().filter(|task| !task.state().is_terminal()).count();
        if unresolved > 0 {
            tracing::warn!(
                plan_id = %plan_id,
                unresolved,
                "plan has unresolved tasks; awaiting intervention"
            );
            return self
                .finish(plan_id, RunOutcome::AwaitingIntervention, None)
                .await;
        }

        self.synthesize_and_close(plan_id, &tasks).await
    }

    /// Dispatches one task until it settles. Returns `false` when the plan
    /// is no longer open.
    async fn drive_task(&self, plan_id: PlanId, task_id: TaskId) -> RunnerResult<bool> {
        loop {
            if !self.store.get_plan(plan_id).await?.is_open() {
                tracing::info!(plan_id = %plan_id, "plan no longer open; stopping dispatch");
                return Ok(false);
            }
            let task = self.store.get_task(task_id).await?;
            if task.state() != TaskState::Pending {
                tracing::debug!(
                    plan_id = %plan_id,
                    task_id = %task_id,
                    state = %task.state(),
                    "skipping task that is no longer pending"
                );
                return Ok(true);
            }
            if self.dispatch(task_id).await? == Step::Settled {
                return Ok(true);
            }
        }
    }

    async fn dispatch(&self, task_id: TaskId) -> RunnerResult<Step> {
        let started = self
            .store
            .set_task_state(task_id, TaskState::InProgress, None)
            .await;
        let Some(task) = tolerate(task_id, started)? else {
            return Ok(Step::Settled);
        };

        let attempt = task.attempts().saturating_add(1);
        tracing::info!(
            plan_id = %task.plan_id(),
            task_id = %task.id(),
            agent = %task.agent(),
            attempt,
            "dispatching task"
        );

        let Some(executor) = self.executors.get(task.agent()) else {
            let error = format!("no executor registered for agent {}", task.agent());
            tracing::warn!(task_id = %task.id(), agent = %task.agent(), "{error}");
            self.escalate(&task, error, None).await?;
            return Ok(Step::Settled);
        };

        let call = executor.run(task.agent(), task.description());
        match tokio::time::timeout(self.policy.executor_timeout(), call).await {
            Err(_) => self.settle_failure(&task, "timeout".to_owned(), None).await,
            Ok(Err(err)) => {
                self.settle_failure(&task, err.message().to_owned(), None)
                    .await
            }
            Ok(Ok(output)) => self.accept_output(&task, output).await,
        }
    }

    async fn accept_output(&self, task: &Task, output: ExecutionOutput) -> RunnerResult<Step> {
        let ExecutionOutput {
            content,
            confidence: reported,
            citations,
        } = output;
        let Ok(confidence) = Confidence::new(reported) else {
            return self
                .settle_failure(task, "executor reported a non-finite confidence".to_owned(), None)
                .await;
        };
        let response = NewAgentResponse::new(task.id(), task.agent().clone(), content, confidence)
            .with_citations(citations);

        match confidence.band() {
            ConfidenceBand::Low => {
                let error = format!("low confidence {confidence}");
                self.settle_failure(task, error, Some(response)).await
            }
            band => {
                if band == ConfidenceBand::Moderate {
                    tracing::warn!(
                        task_id = %task.id(),
                        agent = %task.agent(),
                        confidence = confidence.value(),
                        "task completed with moderate confidence"
                    );
                }
                let recorded = self.store.record_agent_response(response).await;
                if let Some(outcome) = tolerate(task.id(), recorded)? {
                    log_disposition(task, &outcome.response, outcome.disposition);
                }
                Ok(Step::Settled)
            }
        }
    }

    /// Moves a failed attempt to `failed` and retries it, or escalates it
    /// when no attempts remain. `audit` is recorded after the state change so
    /// it can never complete the task.
    async fn settle_failure(
        &self,
        task: &Task,
        error: String,
        audit: Option<NewAgentResponse>,
    ) -> RunnerResult<Step> {
        if !self.policy.has_attempts_remaining(task) {
            self.escalate(task, error, audit).await?;
            return Ok(Step::Settled);
        }

        tracing::warn!(
            task_id = %task.id(),
            agent = %task.agent(),
            attempts = task.attempts(),
            error = %error,
            "task attempt failed; retrying"
        );
        let failed = self
            .store
            .set_task_state(task.id(), TaskState::Failed, Some(error))
            .await;
        if tolerate(task.id(), failed)?.is_none() {
            return Ok(Step::Settled);
        }
        self.record_audit(task.id(), audit).await?;

        let retried = self
            .store
            .mark_retry(task.id(), RetryApproval::Unapproved)
            .await;
        Ok(tolerate(task.id(), retried)?.map_or(Step::Settled, |_| Step::Retry))
    }

    async fn escalate(
        &self,
        task: &Task,
        error: String,
        audit: Option<NewAgentResponse>,
    ) -> RunnerResult<()> {
        tracing::warn!(
            task_id = %task.id(),
            agent = %task.agent(),
            attempts = task.attempts(),
            error = %error,
            "escalating task"
        );
        let escalated = self
            .store
            .set_task_state(task.id(), TaskState::Escalated, Some(error))
            .await;
        if tolerate(task.id(), escalated)?.is_some() {
            self.record_audit(task.id(), audit).await?;
        }
        Ok(())
    }

    async fn record_audit(
        &self,
        task_id: TaskId,
        audit: Option<NewAgentResponse>,
    ) -> RunnerResult<()> {
        if let Some(response) = audit {
            let recorded = self.store.record_agent_response(response).await;
            tolerate(task_id, recorded)?;
        }
        Ok(())
    }

    async fn synthesize_and_close(&self, plan_id: PlanId, tasks: &[Task]) -> RunnerResult<RunReport> {
        let outputs = self.completed_outputs(plan_id, tasks).await?;
        let output_count = outputs.len();

        let synthesis = match self.synthesizer.synthesize(plan_id, outputs).await {
            Ok(synthesis) => synthesis,
            Err(source) => {
                tracing::error!(plan_id = %plan_id, error = %source, "synthesis failed");
                self.store
                    .log_event(
                        plan_id,
                        None,
                        EventKind::SynthesisFailed,
                        json!({ "error": source.to_string() }),
                    )
                    .await?;
                return Err(RunnerError::Synthesis { plan_id, source });
            }
        };

        self.store
            .log_event(
                plan_id,
                None,
                EventKind::SynthesisCompleted,
                json!({
                    "outputs": output_count,
                    "summary": synthesis.summary,
                    "risks": synthesis.risks,
                    "confidence": synthesis.confidence,
                }),
            )
            .await?;

        match self.store.close_plan(plan_id).await {
            Ok(_) => {}
            Err(err) if err.is_invalid_state() => {
                tracing::warn!(plan_id = %plan_id, error = %err, "plan changed before closing");
                let outcome = if self.store.get_plan(plan_id).await?.is_open() {
                    RunOutcome::AwaitingIntervention
                } else {
                    RunOutcome::Cancelled
                };
                return self.finish(plan_id, outcome, None).await;
            }
            Err(err) => return Err(err.into()),
        }
        tracing::info!(plan_id = %plan_id, outputs = output_count, "plan closed");
        self.finish(plan_id, RunOutcome::Closed, Some(synthesis)).await
    }

    /// Pairs each completed task with the response that completed it, which
    /// is always its most recent one.
    async fn completed_outputs(
        &self,
        plan_id: PlanId,
        tasks: &[Task],
    ) -> RunnerResult<Vec<CompletedTaskOutput>> {
        let mut latest: HashMap<TaskId, AgentResponse> = HashMap::new();
        for response in self.store.list_plan_responses(plan_id).await? {
            latest.insert(response.task_id(), response);
        }

        Ok(tasks
            .iter()
            .filter(|task| task.state() == TaskState::Completed)
            .filter_map(|task| latest.remove(&task.id()))
            .map(|response| CompletedTaskOutput {
                task_id: response.task_id(),
                agent: response.agent().clone(),
                content: response.content().to_owned(),
                confidence: response.confidence().value(),
                citations: response.citations().to_vec(),
            })
            .collect())
    }

    async fn finish(
        &self,
        plan_id: PlanId,
        outcome: RunOutcome,
        synthesis: Option<Synthesis>,
    ) -> RunnerResult<RunReport> {
        let tasks = self.store.list_plan_tasks(plan_id).await?;
        tracing::info!(plan_id = %plan_id, outcome = %outcome, "plan run finished");
        Ok(RunReport {
            plan_id,
            outcome,
            tasks,
            synthesis,
        })
    }
}

fn log_disposition(task: &Task, response: &AgentResponse, disposition: ResponseDisposition) {
    match disposition {
        ResponseDisposition::Completed => tracing::info!(
            task_id = %task.id(),
            response_id = %response.id(),
            confidence = response.confidence().value(),
            "task completed"
        ),
        ResponseDisposition::Retained { state } => tracing::warn!(
            task_id = %task.id(),
            response_id = %response.id(),
            state = %state,
            "task changed during execution; response retained for audit"
        ),
    }
}

/// Turns a rejection caused by a concurrent change into `None`.
fn tolerate<T>(task_id: TaskId, result: Result<T, StoreError>) -> RunnerResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_invalid_transition() || err.is_invalid_state() => {
            tracing::warn!(
                task_id = %task_id,
                error = %err,
                "task changed concurrently; skipping"
            );
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
