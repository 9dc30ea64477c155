//! Unit tests for plan domain values and the plan aggregate.

use crate::plan::domain::{
    AgentId, Confidence, ConfidenceBand, EventKind, NewEvent, Plan, PlanDomainError, PlanId,
    PlanStatus, Task, TaskId, TaskState,
};
use eyre::{bail, ensure};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn clock() -> DefaultClock {
    DefaultClock
}

#[rstest]
#[case("", PlanDomainError::EmptyAgentId)]
#[case("   ", PlanDomainError::EmptyAgentId)]
fn agent_id_rejects_blank_values(#[case] raw: &str, #[case] expected: PlanDomainError) {
    assert_eq!(AgentId::new(raw), Err(expected));
}

#[rstest]
fn agent_id_trims_surrounding_whitespace() -> eyre::Result<()> {
    let agent = AgentId::new("  CFO ")?;
    ensure!(agent.as_str() == "CFO");
    ensure!(agent.to_string() == "CFO");
    Ok(())
}

#[rstest]
fn identifiers_round_trip_through_display() -> eyre::Result<()> {
    let plan_id = PlanId::new();
    let parsed: PlanId = plan_id.to_string().parse()?;
    ensure!(parsed == plan_id);
    ensure!("not-a-uuid".parse::<TaskId>().is_err());
    Ok(())
}

#[rstest]
fn plan_requires_non_blank_query(clock: DefaultClock) {
    assert_eq!(
        Plan::new("  \n", &clock).map(|plan| plan.id()),
        Err(PlanDomainError::EmptyQuery)
    );
}

#[rstest]
fn new_plan_is_open_without_close_timestamp(clock: DefaultClock) -> eyre::Result<()> {
    let plan = Plan::new("Launch product", &clock)?;
    ensure!(plan.status() == PlanStatus::Open);
    ensure!(plan.original_query() == "Launch product");
    ensure!(plan.closed_at().is_none());
    ensure!(plan.is_open());
    Ok(())
}

#[rstest]
fn task_requires_non_blank_description(clock: DefaultClock) -> eyre::Result<()> {
    let result = Task::new(PlanId::new(), AgentId::new("CFO")?, " ", 0, &clock);
    ensure!(result == Err(PlanDomainError::EmptyDescription));
    Ok(())
}

#[rstest]
fn close_refuses_plan_with_non_terminal_tasks(clock: DefaultClock) -> eyre::Result<()> {
    let mut plan = Plan::new("Launch product", &clock)?;
    let agent = AgentId::new("CFO")?;
    let mut finished = Task::new(plan.id(), agent.clone(), "budget", 0, &clock)?;
    finished.cancel(&clock)?;
    let open = Task::new(plan.id(), agent, "pricing", 1, &clock)?;

    let result = plan.close(&[finished, open], &clock);

    ensure!(
        result
            == Err(PlanDomainError::NonTerminalTasks {
                plan_id: plan.id(),
                remaining: 1,
            })
    );
    ensure!(plan.status() == PlanStatus::Open);
    Ok(())
}

#[rstest]
fn close_stamps_closed_at_when_all_tasks_are_terminal(clock: DefaultClock) -> eyre::Result<()> {
    let mut plan = Plan::new("Launch product", &clock)?;
    let mut task = Task::new(plan.id(), AgentId::new("CFO")?, "budget", 0, &clock)?;
    task.apply_state(TaskState::InProgress, None, &clock)?;
    task.accept_response(&clock)?;

    plan.close(&[task], &clock)?;

    ensure!(plan.status() == PlanStatus::Closed);
    ensure!(plan.closed_at().is_some());
    Ok(())
}

#[rstest]
fn cancelled_plan_cannot_be_closed_or_cancelled_again(clock: DefaultClock) -> eyre::Result<()> {
    let mut plan = Plan::new("Launch product", &clock)?;
    plan.cancel(&clock)?;

    let expected = PlanDomainError::PlanNotOpen {
        plan_id: plan.id(),
        status: PlanStatus::Cancelled,
    };
    ensure!(plan.cancel(&clock) == Err(expected.clone()));
    ensure!(plan.close(&[], &clock) == Err(expected));
    ensure!(plan.closed_at().is_some());
    Ok(())
}

#[rstest]
#[case(1.4, 1.0)]
#[case(-0.3, 0.0)]
#[case(0.42, 0.42)]
fn confidence_is_clamped_into_unit_interval(
    #[case] raw: f64,
    #[case] expected: f64,
) -> eyre::Result<()> {
    ensure!(Confidence::new(raw)? == Confidence::new(expected)?);
    Ok(())
}

#[rstest]
#[case(f64::NAN)]
#[case(f64::INFINITY)]
#[case(f64::NEG_INFINITY)]
fn confidence_rejects_non_finite_values(#[case] raw: f64) {
    assert_eq!(Confidence::new(raw), Err(PlanDomainError::NonFiniteConfidence));
}

#[rstest]
#[case(0.95, ConfidenceBand::High)]
#[case(0.80, ConfidenceBand::High)]
#[case(0.79, ConfidenceBand::Moderate)]
#[case(0.50, ConfidenceBand::Moderate)]
#[case(0.49, ConfidenceBand::Low)]
#[case(0.0, ConfidenceBand::Low)]
fn confidence_bands_follow_thresholds(
    #[case] raw: f64,
    #[case] expected: ConfidenceBand,
) -> eyre::Result<()> {
    ensure!(Confidence::new(raw)?.band() == expected);
    Ok(())
}

#[rstest]
#[case(EventKind::PlanCreated, true)]
#[case(EventKind::TaskStateChanged, true)]
#[case(EventKind::PlanClosed, true)]
#[case(EventKind::SynthesisCompleted, false)]
#[case(EventKind::SynthesisFailed, false)]
#[case(EventKind::DecompositionFailed, false)]
#[case(EventKind::TaskRecovered, false)]
fn lifecycle_kinds_are_reserved(#[case] kind: EventKind, #[case] lifecycle: bool) {
    assert_eq!(kind.is_lifecycle(), lifecycle);
}

#[rstest]
fn annotation_rejects_lifecycle_kinds(clock: DefaultClock) {
    let result = NewEvent::annotation(
        PlanId::new(),
        None,
        EventKind::PlanClosed,
        json!({}),
        &clock,
    );
    assert_eq!(
        result,
        Err(PlanDomainError::ReservedEventKind("plan_closed".to_owned()))
    );
}

#[rstest]
fn event_kind_parses_its_storage_form() -> eyre::Result<()> {
    for raw in ["task_completed_on_response", "synthesis_failed", "task_recovered"] {
        let kind = EventKind::try_from(raw)?;
        if kind.as_str() != raw {
            bail!("{raw} parsed as {kind}");
        }
    }
    ensure!(EventKind::try_from("task_exploded").is_err());
    Ok(())
}
