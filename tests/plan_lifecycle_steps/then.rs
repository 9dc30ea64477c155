//! Then steps for plan lifecycle BDD scenarios.

use super::world::{PlanWorld, run_async};
use planwright::plan::{
    domain::{PlanStatus, TaskState},
    ports::{EventQuery, PlanStore},
};
use rstest_bdd_macros::then;

fn expected_state(state: &str) -> Result<TaskState, eyre::Report> {
    TaskState::try_from(state).map_err(|err| eyre::eyre!("invalid expected state in scenario: {err}"))
}

#[then(r#"the plan is "{status}" with {count:usize} tasks"#)]
fn plan_has_status_and_tasks(
    world: &PlanWorld,
    status: String,
    count: usize,
) -> Result<(), eyre::Report> {
    let expected = PlanStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let plan_id = world.plan()?.id();
    let plan = run_async(world.store.get_plan(plan_id))?;
    let tasks = run_async(world.store.list_plan_tasks(plan_id))?;

    eyre::ensure!(
        plan.status() == expected,
        "expected plan {expected}, found {}",
        plan.status()
    );
    eyre::ensure!(
        tasks.len() == count,
        "expected {count} tasks, found {}",
        tasks.len()
    );
    Ok(())
}

#[then(r#"the task is "{state}" with {attempts:u32} attempts"#)]
fn task_state_and_attempts(
    world: &PlanWorld,
    state: String,
    attempts: u32,
) -> Result<(), eyre::Report> {
    let expected = expected_state(&state)?;
    let task_id = world.latest_task()?.id();
    let task = run_async(world.store.get_task(task_id))?;

    if task.state() != expected {
        return Err(eyre::eyre!(
            "expected state {}, found {}",
            expected.as_str(),
            task.state().as_str()
        ));
    }
    eyre::ensure!(
        task.attempts() == attempts,
        "expected {attempts} attempts, found {}",
        task.attempts()
    );
    Ok(())
}

#[then("the task has no error")]
fn task_has_no_error(world: &PlanWorld) -> Result<(), eyre::Report> {
    let task_id = world.latest_task()?.id();
    let task = run_async(world.store.get_task(task_id))?;
    eyre::ensure!(
        task.last_error().is_none(),
        "expected no error, found {:?}",
        task.last_error()
    );
    Ok(())
}

#[then("the executor was called {calls:usize} times")]
fn executor_was_called(world: &PlanWorld, calls: usize) -> Result<(), eyre::Report> {
    let executor = world
        .failing
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing failing executor"))?;
    eyre::ensure!(
        executor.calls() == calls,
        "expected {calls} executor calls, found {}",
        executor.calls()
    );
    Ok(())
}

#[then(r#"the run is "{outcome}""#)]
fn run_outcome_is(world: &PlanWorld, outcome: String) -> Result<(), eyre::Report> {
    let report = world
        .report
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing run report"))?;
    eyre::ensure!(
        report.outcome.as_str() == outcome,
        "expected outcome {outcome}, found {}",
        report.outcome
    );
    Ok(())
}

#[then(r#"every task is "{state}""#)]
fn every_task_is(world: &PlanWorld, state: String) -> Result<(), eyre::Report> {
    let expected = expected_state(&state)?;
    let tasks = run_async(world.store.list_plan_tasks(world.plan()?.id()))?;
    eyre::ensure!(
        tasks.iter().all(|task| task.state() == expected),
        "expected every task {expected}"
    );
    Ok(())
}

#[then("the cancellation wrote {count:usize} events")]
fn cancellation_wrote_events(world: &PlanWorld, count: usize) -> Result<(), eyre::Report> {
    let cancellation = world
        .cancellation
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing cancellation"))?;
    let events = run_async(
        world
            .store
            .list_events(EventQuery::for_plan(cancellation.plan.id())),
    )?;
    let written = events.len().saturating_sub(world.events_before_cancel);
    eyre::ensure!(written == count, "expected {count} new events, found {written}");
    Ok(())
}

#[then("the plan has {count:usize} stored responses")]
fn plan_has_responses(world: &PlanWorld, count: usize) -> Result<(), eyre::Report> {
    let responses = run_async(world.store.list_plan_responses(world.plan()?.id()))?;
    eyre::ensure!(
        responses.len() == count,
        "expected {count} responses, found {}",
        responses.len()
    );
    Ok(())
}
