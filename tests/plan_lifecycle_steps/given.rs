//! Given steps for plan lifecycle BDD scenarios.

use std::sync::Arc;

use super::world::{FailingExecutor, PlanWorld, run_async};
use eyre::WrapErr;
use planwright::plan::{
    domain::{AgentId, TaskState},
    ports::PlanStore,
};
use rstest_bdd_macros::given;

#[given(r#"a plan for "{query}""#)]
fn plan_for(world: &mut PlanWorld, query: String) -> Result<(), eyre::Report> {
    let plan = run_async(world.store.create_plan(&query)).wrap_err("create plan")?;
    world.plan = Some(plan);
    Ok(())
}

#[given(r#"a task "{description}" for agent "{agent}""#)]
fn task_for_agent(
    world: &mut PlanWorld,
    description: String,
    agent: String,
) -> Result<(), eyre::Report> {
    let plan_id = world.plan()?.id();
    let agent_id = AgentId::new(agent)?;
    let task = run_async(world.store.add_task(plan_id, &agent_id, &description))
        .wrap_err("add task in scenario setup")?;
    world.remember(task);
    Ok(())
}

#[given("the latest task has started")]
fn latest_task_started(world: &mut PlanWorld) -> Result<(), eyre::Report> {
    let task_id = world.latest_task()?.id();
    let started = run_async(
        world
            .store
            .set_task_state(task_id, TaskState::InProgress, None),
    )
    .wrap_err("start task in scenario setup")?;
    world.remember(started);
    Ok(())
}

#[given(r#"agent "{agent}" always fails with "{message}""#)]
fn agent_always_fails(
    world: &mut PlanWorld,
    agent: String,
    message: String,
) -> Result<(), eyre::Report> {
    let executor = Arc::new(FailingExecutor::new(message));
    world.executors.register(AgentId::new(agent)?, executor.clone());
    world.failing = Some(executor);
    Ok(())
}
