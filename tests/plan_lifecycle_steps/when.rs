//! When steps for plan lifecycle BDD scenarios.

use std::sync::Arc;

use super::world::{ConcatSynthesizer, PlanWorld, run_async};
use eyre::WrapErr;
use planwright::plan::{
    domain::{AgentId, Confidence, NewAgentResponse, RetryApproval, TaskState},
    ports::{EventQuery, PlanStore},
    services::OrchestratorRunner,
};
use rstest_bdd_macros::when;

#[when(r#"a plan is created for "{query}""#)]
fn plan_is_created(world: &mut PlanWorld, query: String) -> Result<(), eyre::Report> {
    let plan = run_async(world.store.create_plan(&query)).wrap_err("create plan")?;
    world.plan = Some(plan);
    Ok(())
}

#[when(r#"a task "{description}" is added for agent "{agent}""#)]
fn task_is_added(
    world: &mut PlanWorld,
    description: String,
    agent: String,
) -> Result<(), eyre::Report> {
    let plan_id = world.plan()?.id();
    let agent_id = AgentId::new(agent)?;
    let task = run_async(world.store.add_task(plan_id, &agent_id, &description))
        .wrap_err("add task")?;
    world.remember(task);
    Ok(())
}

#[when(r#"the task moves to "{state}""#)]
fn task_moves_to(world: &mut PlanWorld, state: String) -> Result<(), eyre::Report> {
    let target = TaskState::try_from(state.as_str())?;
    let task_id = world.latest_task()?.id();
    let moved = run_async(world.store.set_task_state(task_id, target, None))
        .wrap_err("move task")?;
    world.remember(moved);
    Ok(())
}

#[when(r#"the task fails with "{error}""#)]
fn task_fails_with(world: &mut PlanWorld, error: String) -> Result<(), eyre::Report> {
    let task_id = world.latest_task()?.id();
    let failed = run_async(
        world
            .store
            .set_task_state(task_id, TaskState::Failed, Some(error)),
    )
    .wrap_err("fail task")?;
    world.remember(failed);
    Ok(())
}

#[when("the task is retried")]
fn task_is_retried(world: &mut PlanWorld) -> Result<(), eyre::Report> {
    let task_id = world.latest_task()?.id();
    let retried = run_async(world.store.mark_retry(task_id, RetryApproval::Unapproved))
        .wrap_err("retry task")?;
    world.remember(retried);
    Ok(())
}

#[when("the task is cancelled")]
fn task_is_cancelled(world: &mut PlanWorld) -> Result<(), eyre::Report> {
    let task_id = world.latest_task()?.id();
    let cancelled = run_async(world.store.cancel_task(task_id)).wrap_err("cancel task")?;
    world.remember(cancelled);
    Ok(())
}

#[when(r#"agent "{agent}" responds "{content}" with confidence {confidence:f64}"#)]
fn agent_responds(
    world: &mut PlanWorld,
    agent: String,
    content: String,
    confidence: f64,
) -> Result<(), eyre::Report> {
    let task_id = world.latest_task()?.id();
    let response = NewAgentResponse::new(
        task_id,
        AgentId::new(agent)?,
        content,
        Confidence::new(confidence)?,
    );
    run_async(world.store.record_agent_response(response)).wrap_err("record response")?;
    let reloaded = run_async(world.store.get_task(task_id))?;
    world.remember(reloaded);
    Ok(())
}

#[when("the plan is run")]
fn plan_is_run(world: &mut PlanWorld) -> Result<(), eyre::Report> {
    let plan_id = world.plan()?.id();
    let runner = OrchestratorRunner::new(
        Arc::clone(&world.store),
        Arc::new(world.executors.clone()),
        Arc::new(ConcatSynthesizer),
    );
    let report = run_async(runner.run(plan_id)).wrap_err("run plan")?;
    for task in &report.tasks {
        world.remember(task.clone());
    }
    world.report = Some(report);
    Ok(())
}

#[when("the plan is cancelled")]
fn plan_is_cancelled(world: &mut PlanWorld) -> Result<(), eyre::Report> {
    let plan_id = world.plan()?.id();
    world.events_before_cancel =
        run_async(world.store.list_events(EventQuery::for_plan(plan_id)))?.len();
    let cancellation = run_async(world.store.cancel_plan(plan_id)).wrap_err("cancel plan")?;
    world.plan = Some(cancellation.plan.clone());
    world.cancellation = Some(cancellation);
    Ok(())
}
