//! Behaviour every `PlanStore` implementation must share.
//!
//! Each check takes a store by reference so the in-memory and `SQLite`
//! suites can run the same assertions against their own adapter.

use eyre::{bail, ensure};
use planwright::plan::{
    domain::{
        AgentId, Confidence, EventKind, NewAgentResponse, PlanId, PlanStatus,
        ResponseDisposition, RetryApproval, TaskId, TaskState,
    },
    ports::{EventQuery, PlanStore},
};
use serde_json::json;

fn agent(name: &str) -> eyre::Result<AgentId> {
    Ok(AgentId::new(name)?)
}

/// Drives a two-task plan to closure and checks the event trail.
pub async fn full_lifecycle_closes_plan(store: &impl PlanStore) -> eyre::Result<()> {
    let plan = store.create_plan("Launch product").await?;
    let first = store.add_task(plan.id(), &agent("CFO")?, "budget").await?;
    let second = store.add_task(plan.id(), &agent("CTO")?, "stack").await?;
    ensure!(first.position() == 0 && second.position() == 1);

    for task in [&first, &second] {
        store
            .set_task_state(task.id(), TaskState::InProgress, None)
            .await?;
        let recorded = store
            .record_agent_response(NewAgentResponse::new(
                task.id(),
                task.agent().clone(),
                format!("answer for {}", task.description()),
                Confidence::new(0.9)?,
            ))
            .await?;
        ensure!(recorded.disposition == ResponseDisposition::Completed);
    }

    let closed = store.close_plan(plan.id()).await?;
    ensure!(closed.status() == PlanStatus::Closed);
    ensure!(closed.closed_at().is_some());
    let reloaded = store.get_plan(plan.id()).await?;
    ensure!(reloaded.status() == PlanStatus::Closed);
    ensure!(reloaded.original_query() == "Launch product");

    let kinds: Vec<EventKind> = store
        .list_events(EventQuery::for_plan(plan.id()))
        .await?
        .iter()
        .map(|event| event.kind())
        .collect();
    ensure!(
        kinds
            == [
                EventKind::PlanCreated,
                EventKind::TaskCreated,
                EventKind::TaskCreated,
                EventKind::TaskStateChanged,
                EventKind::TaskCompletedOnResponse,
                EventKind::TaskStateChanged,
                EventKind::TaskCompletedOnResponse,
                EventKind::PlanClosed,
            ],
        "unexpected event trail {kinds:?}"
    );
    Ok(())
}

/// Responses keep their citations and clamped confidence, and late answers
/// are retained without reviving the task.
pub async fn responses_are_persisted_for_audit(store: &impl PlanStore) -> eyre::Result<()> {
    let plan = store.create_plan("Price the product").await?;
    let task = store.add_task(plan.id(), &agent("CFO")?, "pricing").await?;
    store
        .set_task_state(task.id(), TaskState::InProgress, None)
        .await?;
    store
        .set_task_state(task.id(), TaskState::Failed, Some("timeout".to_owned()))
        .await?;

    let recorded = store
        .record_agent_response(
            NewAgentResponse::new(
                task.id(),
                task.agent().clone(),
                "late answer",
                Confidence::new(1.7)?,
            )
            .with_citations(["pricing.xlsx".to_owned(), "market.pdf".to_owned()]),
        )
        .await?;

    ensure!(
        recorded.disposition
            == ResponseDisposition::Retained {
                state: TaskState::Failed
            }
    );
    let stored = store.list_plan_responses(plan.id()).await?;
    let Some(response) = stored.first() else {
        bail!("response was not stored");
    };
    ensure!(response.content() == "late answer");
    ensure!(response.citations() == ["pricing.xlsx", "market.pdf"]);
    ensure!(response.confidence() == Confidence::new(1.0)?);
    let reloaded = store.get_task(task.id()).await?;
    ensure!(reloaded.state() == TaskState::Failed);
    ensure!(reloaded.last_error() == Some("timeout"));
    Ok(())
}

/// Cancelling a plan cancels its unfinished tasks atomically.
pub async fn cancel_plan_cascades(store: &impl PlanStore) -> eyre::Result<()> {
    let plan = store.create_plan("Hire team").await?;
    let done = store.add_task(plan.id(), &agent("HR")?, "job spec").await?;
    let running = store.add_task(plan.id(), &agent("CFO")?, "salary").await?;
    let waiting = store.add_task(plan.id(), &agent("CTO")?, "interviews").await?;
    store
        .set_task_state(done.id(), TaskState::InProgress, None)
        .await?;
    store
        .record_agent_response(NewAgentResponse::new(
            done.id(),
            done.agent().clone(),
            "spec ready",
            Confidence::new(0.95)?,
        ))
        .await?;
    store
        .set_task_state(running.id(), TaskState::InProgress, None)
        .await?;

    let cancellation = store.cancel_plan(plan.id()).await?;

    ensure!(cancellation.plan.status() == PlanStatus::Cancelled);
    ensure!(cancellation.cancelled_tasks == [running.id(), waiting.id()]);
    let states: Vec<TaskState> = store
        .list_plan_tasks(plan.id())
        .await?
        .iter()
        .map(|task| task.state())
        .collect();
    ensure!(states == [TaskState::Completed, TaskState::Cancelled, TaskState::Cancelled]);

    let second = store.cancel_plan(plan.id()).await;
    ensure!(second.is_err_and(|err| err.is_invalid_state()));
    let added = store.add_task(plan.id(), &agent("HR")?, "onboarding").await;
    ensure!(added.is_err_and(|err| err.is_invalid_state()));
    Ok(())
}

/// Retries count attempts and escalated tasks need approval.
pub async fn retry_rules_are_enforced(store: &impl PlanStore) -> eyre::Result<()> {
    let plan = store.create_plan("Audit books").await?;
    let task = store.add_task(plan.id(), &agent("CFO")?, "ledger").await?;
    store
        .set_task_state(task.id(), TaskState::InProgress, None)
        .await?;
    store
        .set_task_state(task.id(), TaskState::Escalated, Some("stuck".to_owned()))
        .await?;

    let refused = store.mark_retry(task.id(), RetryApproval::Unapproved).await;
    ensure!(refused.is_err_and(|err| err.is_invalid_transition()));
    ensure!(store.get_task(task.id()).await?.attempts() == 0);

    let retried = store.mark_retry(task.id(), RetryApproval::Approved).await?;
    ensure!(retried.state() == TaskState::Pending);
    ensure!(retried.attempts() == 1);
    ensure!(retried.last_error().is_none());
    let reloaded = store.get_task(task.id()).await?;
    ensure!(reloaded.state() == TaskState::Pending && reloaded.attempts() == 1);

    let invalid = store
        .set_task_state(task.id(), TaskState::Escalated, None)
        .await;
    ensure!(invalid.is_err_and(|err| err.is_invalid_transition()));
    Ok(())
}

/// Annotations are stored with their payload, lifecycle kinds are refused,
/// and the event window keeps the most recent entries.
pub async fn events_are_appended_in_order(store: &impl PlanStore) -> eyre::Result<()> {
    let plan = store.create_plan("Write report").await?;
    let task = store.add_task(plan.id(), &agent("CMO")?, "draft").await?;
    let note = store
        .log_event(
            plan.id(),
            Some(task.id()),
            EventKind::SynthesisFailed,
            json!({ "error": "model unavailable" }),
        )
        .await?;
    ensure!(note.payload()["error"] == "model unavailable");

    let reserved = store
        .log_event(plan.id(), None, EventKind::PlanClosed, json!({}))
        .await;
    ensure!(reserved.is_err_and(|err| err.is_invalid_state()));

    let all = store.list_events(EventQuery::for_plan(plan.id())).await?;
    ensure!(all.len() == 3);
    ensure!(
        all.windows(2)
            .all(|pair| pair.first().map(|e| e.sequence()) < pair.last().map(|e| e.sequence()))
    );
    let latest = store
        .list_events(EventQuery::for_plan(plan.id()).with_limit(2))
        .await?;
    ensure!(latest.last().map(|event| event.id()) == Some(note.id()));
    ensure!(latest.len() == 2);
    Ok(())
}

/// Tasks in a given state are found across plans.
pub async fn tasks_are_listed_by_state(store: &impl PlanStore) -> eyre::Result<()> {
    let first_plan = store.create_plan("Plan one").await?;
    let second_plan = store.create_plan("Plan two").await?;
    let a = store.add_task(first_plan.id(), &agent("CFO")?, "a").await?;
    let b = store.add_task(second_plan.id(), &agent("CTO")?, "b").await?;
    store.add_task(second_plan.id(), &agent("CMO")?, "c").await?;
    store
        .set_task_state(a.id(), TaskState::InProgress, None)
        .await?;
    store
        .set_task_state(b.id(), TaskState::InProgress, None)
        .await?;

    let mut running: Vec<_> = store
        .list_tasks_in_state(TaskState::InProgress)
        .await?
        .iter()
        .map(|task| task.id())
        .collect();
    running.sort_unstable();
    let mut expected = vec![a.id(), b.id()];
    expected.sort_unstable();
    ensure!(running == expected);

    let open = store.list_plans(Some(PlanStatus::Open)).await?;
    ensure!(open.len() == 2);
    Ok(())
}

/// Missing identifiers surface as not-found errors.
pub async fn missing_records_are_not_found(store: &impl PlanStore) -> eyre::Result<()> {
    let plan = store.create_plan("Exists").await?;
    let task = store.add_task(plan.id(), &agent("CFO")?, "exists").await?;
    let other = store.create_plan("Other").await?;

    ensure!(
        store
            .get_plan(PlanId::new())
            .await
            .is_err_and(|err| err.is_not_found())
    );
    ensure!(
        store
            .get_task(TaskId::new())
            .await
            .is_err_and(|err| err.is_not_found())
    );
    let foreign = store
        .log_event(other.id(), Some(task.id()), EventKind::TaskRecovered, json!({}))
        .await;
    ensure!(foreign.is_err_and(|err| err.is_not_found()));
    Ok(())
}
