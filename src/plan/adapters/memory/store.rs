//! In-memory plan store for tests and ephemeral runs.

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::plan::{
    domain::{
        AgentId, AgentResponse, Event, EventKind, NewAgentResponse, NewEvent, Plan, PlanId,
        PlanStatus, RecordedResponse, ResponseDisposition, RetryApproval, Task, TaskId, TaskState,
    },
    ports::{EventQuery, PlanCancellation, PlanStore, StoreError, StoreResult},
};

/// Thread-safe in-memory plan store.
///
/// Every operation holds the write lock for its whole duration, which makes
/// multi-row mutations such as plan cancellation atomic.
pub struct InMemoryPlanStore<C = DefaultClock> {
    state: Arc<RwLock<InMemoryPlanState>>,
    clock: Arc<C>,
}

impl<C> Clone for InMemoryPlanStore<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryPlanState {
    plans: HashMap<PlanId, Plan>,
    plan_order: Vec<PlanId>,
    tasks: HashMap<TaskId, Task>,
    plan_tasks: HashMap<PlanId, Vec<TaskId>>,
    responses: Vec<AgentResponse>,
    events: Vec<Event>,
    next_sequence: u64,
}

impl InMemoryPlanState {
    fn plan(&self, plan_id: PlanId) -> StoreResult<&Plan> {
        self.plans
            .get(&plan_id)
            .ok_or(StoreError::PlanNotFound(plan_id))
    }

    fn task(&self, task_id: TaskId) -> StoreResult<&Task> {
        self.tasks
            .get(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))
    }

    fn tasks_of(&self, plan_id: PlanId) -> Vec<Task> {
        self.plan_tasks
            .get(&plan_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn append(&mut self, event: NewEvent) -> Event {
        self.next_sequence = self.next_sequence.saturating_add(1);
        let sealed = Event::from_new(event, self.next_sequence);
        self.events.push(sealed.clone());
        sealed
    }

    fn put_task(&mut self, task: Task) {
        self.tasks.insert(task.id(), task);
    }
}

impl InMemoryPlanStore<DefaultClock> {
    /// Creates an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl Default for InMemoryPlanStore<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryPlanStore<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty store using the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryPlanState::default())),
            clock,
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, InMemoryPlanState>> {
        self.state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, InMemoryPlanState>> {
        self.state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl<C> PlanStore for InMemoryPlanStore<C>
where
    C: Clock + Send + Sync,
{
    async fn create_plan(&self, query: &str) -> StoreResult<Plan> {
        let clock = &*self.clock;
        let plan = Plan::new(query, clock)?;
        let mut state = self.write()?;
        state.plans.insert(plan.id(), plan.clone());
        state.plan_order.push(plan.id());
        state.plan_tasks.insert(plan.id(), Vec::new());
        state.append(NewEvent::plan_created(&plan, clock));
        Ok(plan)
    }

    async fn get_plan(&self, plan_id: PlanId) -> StoreResult<Plan> {
        self.read()?.plan(plan_id).cloned()
    }

    async fn list_plans(&self, status: Option<PlanStatus>) -> StoreResult<Vec<Plan>> {
        let state = self.read()?;
        Ok(state
            .plan_order
            .iter()
            .filter_map(|id| state.plans.get(id))
            .filter(|plan| status.is_none_or(|wanted| plan.status() == wanted))
            .cloned()
            .collect())
    }

    async fn add_task(
        &self,
        plan_id: PlanId,
        agent: &AgentId,
        description: &str,
    ) -> StoreResult<Task> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        state.plan(plan_id)?.ensure_open()?;
        let existing = state.plan_tasks.get(&plan_id).map_or(0, Vec::len);
        let position = u32::try_from(existing).map_err(StoreError::persistence)?;
        let task = Task::new(plan_id, agent.clone(), description, position, clock)?;

        state
            .plan_tasks
            .entry(plan_id)
            .or_default()
            .push(task.id());
        state.put_task(task.clone());
        state.append(NewEvent::task_created(&task, clock));
        Ok(task)
    }

    async fn get_task(&self, task_id: TaskId) -> StoreResult<Task> {
        self.read()?.task(task_id).cloned()
    }

    async fn list_plan_tasks(&self, plan_id: PlanId) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        state.plan(plan_id)?;
        Ok(state.tasks_of(plan_id))
    }

    async fn list_tasks_in_state(&self, task_state: TaskState) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state
            .plan_order
            .iter()
            .flat_map(|plan_id| state.tasks_of(*plan_id))
            .filter(|task| task.state() == task_state)
            .collect())
    }

    async fn set_task_state(
        &self,
        task_id: TaskId,
        next: TaskState,
        error: Option<String>,
    ) -> StoreResult<Task> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        let mut task = state.task(task_id)?.clone();
        let previous = task.apply_state(next, error, clock)?;

        let event = NewEvent::task_state_changed(&task, previous, task.last_error(), clock);
        state.put_task(task.clone());
        state.append(event);
        Ok(task)
    }

    async fn record_agent_response(
        &self,
        input: NewAgentResponse,
    ) -> StoreResult<RecordedResponse> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        let mut task = state.task(input.task_id)?.clone();
        let disposition = task.accept_response(clock)?;
        let response = AgentResponse::new(input, clock);

        let event = match disposition {
            ResponseDisposition::Completed => {
                NewEvent::task_completed_on_response(&task, &response, clock)
            }
            ResponseDisposition::Retained { .. } => {
                NewEvent::task_response_retained(&task, &response, clock)
            }
        };
        state.responses.push(response.clone());
        state.put_task(task);
        state.append(event);
        Ok(RecordedResponse {
            response,
            disposition,
        })
    }

    async fn list_plan_responses(&self, plan_id: PlanId) -> StoreResult<Vec<AgentResponse>> {
        let state = self.read()?;
        state.plan(plan_id)?;
        Ok(state
            .responses
            .iter()
            .filter(|response| {
                state
                    .tasks
                    .get(&response.task_id())
                    .is_some_and(|task| task.plan_id() == plan_id)
            })
            .cloned()
            .collect())
    }

    async fn mark_retry(&self, task_id: TaskId, approval: RetryApproval) -> StoreResult<Task> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        let mut task = state.task(task_id)?.clone();
        state.plan(task.plan_id())?.ensure_open()?;
        let previous = task.retry(approval, clock)?;

        let event = NewEvent::task_retry(&task, previous, clock);
        state.put_task(task.clone());
        state.append(event);
        Ok(task)
    }

    async fn cancel_task(&self, task_id: TaskId) -> StoreResult<Task> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        let mut task = state.task(task_id)?.clone();
        let previous = task.cancel(clock)?;

        let event = NewEvent::task_cancelled(&task, previous, clock);
        state.put_task(task.clone());
        state.append(event);
        Ok(task)
    }

    async fn cancel_plan(&self, plan_id: PlanId) -> StoreResult<PlanCancellation> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        let mut plan = state.plan(plan_id)?.clone();
        plan.cancel(clock)?;

        let mut cancelled = Vec::new();
        for mut task in state.tasks_of(plan_id) {
            if !task.state().is_cancellable() {
                continue;
            }
            let previous = task.cancel(clock)?;
            cancelled.push((task, previous));
        }

        state.plans.insert(plan_id, plan.clone());
        state.append(NewEvent::plan_cancelled(&plan, cancelled.len(), clock));
        let mut cancelled_tasks = Vec::with_capacity(cancelled.len());
        for (task, previous) in cancelled {
            cancelled_tasks.push(task.id());
            state.append(NewEvent::task_cancelled(&task, previous, clock));
            state.put_task(task);
        }
        Ok(PlanCancellation {
            plan,
            cancelled_tasks,
        })
    }

    async fn close_plan(&self, plan_id: PlanId) -> StoreResult<Plan> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        let mut plan = state.plan(plan_id)?.clone();
        let tasks = state.tasks_of(plan_id);
        plan.close(&tasks, clock)?;

        state.plans.insert(plan_id, plan.clone());
        state.append(NewEvent::plan_closed(&plan, clock));
        Ok(plan)
    }

    async fn log_event(
        &self,
        plan_id: PlanId,
        task_id: Option<TaskId>,
        kind: EventKind,
        payload: Value,
    ) -> StoreResult<Event> {
        let clock = &*self.clock;
        let mut state = self.write()?;
        state.plan(plan_id)?;
        if let Some(id) = task_id {
            let owner = state.task(id)?.plan_id();
            if owner != plan_id {
                return Err(StoreError::TaskNotFound(id));
            }
        }
        let event = NewEvent::annotation(plan_id, task_id, kind, payload, clock)?;
        Ok(state.append(event))
    }

    async fn list_events(&self, query: EventQuery) -> StoreResult<Vec<Event>> {
        let state = self.read()?;
        let matching: Vec<&Event> = state
            .events
            .iter()
            .filter(|event| query.matches(event))
            .collect();
        let skip = matching.len().saturating_sub(query.limit());
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }
}
