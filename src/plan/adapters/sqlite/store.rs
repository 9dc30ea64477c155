//! `SQLite` plan store.
//!
//! Every mutating operation loads the affected aggregates, applies the
//! domain transition and writes the rows plus their events inside one
//! `BEGIN IMMEDIATE` transaction, so a rejected transition or a crash
//! mid-write leaves no partial state behind.

use super::{
    connection::{PlanSqlitePool, open_pool},
    models::{EventRow, NewEventRow, NewResponseRow, PlanRow, ResponseRow, TaskRow},
    schema::{agent_responses, events, plans, tasks},
};
use crate::plan::{
    domain::{
        AgentId, AgentResponse, Confidence, Event, EventId, EventKind, NewAgentResponse,
        NewEvent, PersistedPlanData, PersistedResponseData, PersistedTaskData, Plan, PlanId,
        PlanStatus, RecordedResponse, ResponseDisposition, ResponseId, RetryApproval, Task,
        TaskId, TaskState,
    },
    ports::{EventQuery, PlanCancellation, PlanStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        Self::persistence(err)
    }
}

/// `SQLite`-backed plan store.
pub struct SqlitePlanStore<C = DefaultClock> {
    pool: PlanSqlitePool,
    clock: Arc<C>,
}

impl<C> Clone for SqlitePlanStore<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl SqlitePlanStore<DefaultClock> {
    /// Opens (and if needed creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the database cannot be
    /// opened or its schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let pool = open_pool(path.as_ref())?;
        Ok(Self::new(pool, Arc::new(DefaultClock)))
    }
}

impl<C> SqlitePlanStore<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a store from an already configured pool.
    #[must_use]
    pub const fn new(pool: PlanSqlitePool, clock: Arc<C>) -> Self {
        Self { pool, clock }
    }

    async fn run_blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(StoreError::persistence)?;
            f(&mut *connection)
        })
        .await
        .map_err(StoreError::persistence)?
    }

    async fn read<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_blocking(move |connection| connection.transaction(f))
            .await
    }

    async fn write<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection, &C) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let clock = Arc::clone(&self.clock);
        self.run_blocking(move |connection| {
            connection.immediate_transaction(|tx| f(tx, &*clock))
        })
        .await
    }
}

#[async_trait]
impl<C> PlanStore for SqlitePlanStore<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn create_plan(&self, query: &str) -> StoreResult<Plan> {
        let original_query = query.to_owned();
        self.write(move |connection, clock| {
            let plan = Plan::new(original_query, clock)?;
            diesel::insert_into(plans::table)
                .values(&plan_to_row(&plan))
                .execute(connection)?;
            insert_event(connection, NewEvent::plan_created(&plan, clock))?;
            Ok(plan)
        })
        .await
    }

    async fn get_plan(&self, plan_id: PlanId) -> StoreResult<Plan> {
        self.read(move |connection| load_plan(connection, plan_id))
            .await
    }

    async fn list_plans(&self, status: Option<PlanStatus>) -> StoreResult<Vec<Plan>> {
        self.read(move |connection| {
            let mut query = plans::table
                .select(PlanRow::as_select())
                .order((plans::created_at.asc(), plans::id.asc()))
                .into_boxed();
            if let Some(wanted) = status {
                query = query.filter(plans::status.eq(wanted.as_str()));
            }
            query
                .load::<PlanRow>(connection)?
                .into_iter()
                .map(row_to_plan)
                .collect()
        })
        .await
    }

    async fn add_task(
        &self,
        plan_id: PlanId,
        agent: &AgentId,
        description: &str,
    ) -> StoreResult<Task> {
        let owned_agent = agent.clone();
        let owned_description = description.to_owned();
        self.write(move |connection, clock| {
            load_plan(connection, plan_id)?.ensure_open()?;
            let existing: i64 = tasks::table
                .filter(tasks::plan_id.eq(plan_id.to_string()))
                .count()
                .get_result(connection)?;
            let position = u32::try_from(existing).map_err(StoreError::persistence)?;
            let task = Task::new(plan_id, owned_agent, owned_description, position, clock)?;
            diesel::insert_into(tasks::table)
                .values(&task_to_row(&task)?)
                .execute(connection)?;
            insert_event(connection, NewEvent::task_created(&task, clock))?;
            Ok(task)
        })
        .await
    }

    async fn get_task(&self, task_id: TaskId) -> StoreResult<Task> {
        self.read(move |connection| load_task(connection, task_id))
            .await
    }

    async fn list_plan_tasks(&self, plan_id: PlanId) -> StoreResult<Vec<Task>> {
        self.read(move |connection| {
            load_plan(connection, plan_id)?;
            load_plan_tasks(connection, plan_id)
        })
        .await
    }

    async fn list_tasks_in_state(&self, state: TaskState) -> StoreResult<Vec<Task>> {
        self.read(move |connection| {
            tasks::table
                .inner_join(plans::table)
                .filter(tasks::state.eq(state.as_str()))
                .order((plans::created_at.asc(), tasks::plan_id.asc(), tasks::position.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?
                .into_iter()
                .map(row_to_task)
                .collect()
        })
        .await
    }

    async fn set_task_state(
        &self,
        task_id: TaskId,
        next: TaskState,
        error: Option<String>,
    ) -> StoreResult<Task> {
        self.write(move |connection, clock| {
            let mut task = load_task(connection, task_id)?;
            let previous = task.apply_state(next, error, clock)?;
            save_task(connection, &task)?;
            insert_event(
                connection,
                NewEvent::task_state_changed(&task, previous, task.last_error(), clock),
            )?;
            Ok(task)
        })
        .await
    }

    async fn record_agent_response(
        &self,
        input: NewAgentResponse,
    ) -> StoreResult<RecordedResponse> {
        self.write(move |connection, clock| {
            let mut task = load_task(connection, input.task_id)?;
            let disposition = task.accept_response(clock)?;
            let response = AgentResponse::new(input, clock);
            diesel::insert_into(agent_responses::table)
                .values(&response_to_row(&response)?)
                .execute(connection)?;

            let event = match disposition {
                ResponseDisposition::Completed => {
                    save_task(connection, &task)?;
                    NewEvent::task_completed_on_response(&task, &response, clock)
                }
                ResponseDisposition::Retained { .. } => {
                    NewEvent::task_response_retained(&task, &response, clock)
                }
            };
            insert_event(connection, event)?;
            Ok(RecordedResponse {
                response,
                disposition,
            })
        })
        .await
    }

    async fn list_plan_responses(&self, plan_id: PlanId) -> StoreResult<Vec<AgentResponse>> {
        self.read(move |connection| {
            load_plan(connection, plan_id)?;
            agent_responses::table
                .inner_join(tasks::table)
                .filter(tasks::plan_id.eq(plan_id.to_string()))
                .order(agent_responses::sequence.asc())
                .select(ResponseRow::as_select())
                .load::<ResponseRow>(connection)?
                .into_iter()
                .map(row_to_response)
                .collect()
        })
        .await
    }

    async fn mark_retry(&self, task_id: TaskId, approval: RetryApproval) -> StoreResult<Task> {
        self.write(move |connection, clock| {
            let mut task = load_task(connection, task_id)?;
            load_plan(connection, task.plan_id())?.ensure_open()?;
            let previous = task.retry(approval, clock)?;
            save_task(connection, &task)?;
            insert_event(connection, NewEvent::task_retry(&task, previous, clock))?;
            Ok(task)
        })
        .await
    }

    async fn cancel_task(&self, task_id: TaskId) -> StoreResult<Task> {
        self.write(move |connection, clock| {
            let mut task = load_task(connection, task_id)?;
            let previous = task.cancel(clock)?;
            save_task(connection, &task)?;
            insert_event(connection, NewEvent::task_cancelled(&task, previous, clock))?;
            Ok(task)
        })
        .await
    }

    async fn cancel_plan(&self, plan_id: PlanId) -> StoreResult<PlanCancellation> {
        self.write(move |connection, clock| {
            let mut plan = load_plan(connection, plan_id)?;
            plan.cancel(clock)?;
            save_plan(connection, &plan)?;

            let mut cancelled = Vec::new();
            for mut task in load_plan_tasks(connection, plan_id)? {
                if !task.state().is_cancellable() {
                    continue;
                }
                let previous = task.cancel(clock)?;
                save_task(connection, &task)?;
                cancelled.push((task, previous));
            }

            insert_event(
                connection,
                NewEvent::plan_cancelled(&plan, cancelled.len(), clock),
            )?;
            let mut cancelled_tasks = Vec::with_capacity(cancelled.len());
            for (task, previous) in cancelled {
                insert_event(connection, NewEvent::task_cancelled(&task, previous, clock))?;
                cancelled_tasks.push(task.id());
            }
            Ok(PlanCancellation {
                plan,
                cancelled_tasks,
            })
        })
        .await
    }

    async fn close_plan(&self, plan_id: PlanId) -> StoreResult<Plan> {
        self.write(move |connection, clock| {
            let mut plan = load_plan(connection, plan_id)?;
            let plan_tasks = load_plan_tasks(connection, plan_id)?;
            plan.close(&plan_tasks, clock)?;
            save_plan(connection, &plan)?;
            insert_event(connection, NewEvent::plan_closed(&plan, clock))?;
            Ok(plan)
        })
        .await
    }

    async fn log_event(
        &self,
        plan_id: PlanId,
        task_id: Option<TaskId>,
        kind: EventKind,
        payload: Value,
    ) -> StoreResult<Event> {
        self.write(move |connection, clock| {
            load_plan(connection, plan_id)?;
            if let Some(id) = task_id {
                if load_task(connection, id)?.plan_id() != plan_id {
                    return Err(StoreError::TaskNotFound(id));
                }
            }
            let event = NewEvent::annotation(plan_id, task_id, kind, payload, clock)?;
            insert_event(connection, event)
        })
        .await
    }

    async fn list_events(&self, query: EventQuery) -> StoreResult<Vec<Event>> {
        self.read(move |connection| {
            let limit = i64::try_from(query.limit()).map_err(StoreError::persistence)?;
            let mut statement = events::table
                .filter(events::plan_id.eq(query.plan_id().to_string()))
                .select(EventRow::as_select())
                .order(events::sequence.desc())
                .limit(limit)
                .into_boxed();
            if let Some(task_id) = query.task_id() {
                statement = statement.filter(events::task_id.eq(task_id.to_string()));
            }
            let mut newest_first = statement
                .load::<EventRow>(connection)?
                .into_iter()
                .map(row_to_event)
                .collect::<StoreResult<Vec<_>>>()?;
            newest_first.reverse();
            Ok(newest_first)
        })
        .await
    }
}

fn load_plan(connection: &mut SqliteConnection, plan_id: PlanId) -> StoreResult<Plan> {
    plans::table
        .filter(plans::id.eq(plan_id.to_string()))
        .select(PlanRow::as_select())
        .first::<PlanRow>(connection)
        .optional()?
        .ok_or(StoreError::PlanNotFound(plan_id))
        .and_then(row_to_plan)
}

fn load_task(connection: &mut SqliteConnection, task_id: TaskId) -> StoreResult<Task> {
    tasks::table
        .filter(tasks::id.eq(task_id.to_string()))
        .select(TaskRow::as_select())
        .first::<TaskRow>(connection)
        .optional()?
        .ok_or(StoreError::TaskNotFound(task_id))
        .and_then(row_to_task)
}

fn load_plan_tasks(connection: &mut SqliteConnection, plan_id: PlanId) -> StoreResult<Vec<Task>> {
    tasks::table
        .filter(tasks::plan_id.eq(plan_id.to_string()))
        .order(tasks::position.asc())
        .select(TaskRow::as_select())
        .load::<TaskRow>(connection)?
        .into_iter()
        .map(row_to_task)
        .collect()
}

fn save_plan(connection: &mut SqliteConnection, plan: &Plan) -> StoreResult<()> {
    diesel::update(plans::table.filter(plans::id.eq(plan.id().to_string())))
        .set((
            plans::status.eq(plan.status().as_str()),
            plans::closed_at.eq(plan.closed_at().map(|at| at.naive_utc())),
        ))
        .execute(connection)?;
    Ok(())
}

fn save_task(connection: &mut SqliteConnection, task: &Task) -> StoreResult<()> {
    let attempts = i32::try_from(task.attempts()).map_err(StoreError::persistence)?;
    diesel::update(tasks::table.filter(tasks::id.eq(task.id().to_string())))
        .set((
            tasks::state.eq(task.state().as_str()),
            tasks::attempts.eq(attempts),
            tasks::last_error.eq(task.last_error()),
            tasks::updated_at.eq(task.updated_at().naive_utc()),
        ))
        .execute(connection)?;
    Ok(())
}

fn insert_event(connection: &mut SqliteConnection, event: NewEvent) -> StoreResult<Event> {
    let row = NewEventRow {
        id: event.id.to_string(),
        plan_id: event.plan_id.to_string(),
        task_id: event.task_id.map(|id| id.to_string()),
        kind: event.kind.as_str().to_owned(),
        payload: serde_json::to_string(&event.payload).map_err(StoreError::persistence)?,
        created_at: event.created_at.naive_utc(),
    };
    diesel::insert_into(events::table)
        .values(&row)
        .execute(connection)?;
    let sequence: Option<i64> = events::table
        .select(diesel::dsl::max(events::sequence))
        .first(connection)?;
    let assigned = sequence
        .ok_or_else(|| StoreError::persistence(std::io::Error::other("event sequence missing")))?;
    let sequence_number = u64::try_from(assigned).map_err(StoreError::persistence)?;
    Ok(Event::from_new(event, sequence_number))
}

fn plan_to_row(plan: &Plan) -> PlanRow {
    PlanRow {
        id: plan.id().to_string(),
        original_query: plan.original_query().to_owned(),
        status: plan.status().as_str().to_owned(),
        created_at: plan.created_at().naive_utc(),
        closed_at: plan.closed_at().map(|at| at.naive_utc()),
    }
}

fn task_to_row(task: &Task) -> StoreResult<TaskRow> {
    Ok(TaskRow {
        id: task.id().to_string(),
        plan_id: task.plan_id().to_string(),
        agent: task.agent().as_str().to_owned(),
        description: task.description().to_owned(),
        position: i32::try_from(task.position()).map_err(StoreError::persistence)?,
        state: task.state().as_str().to_owned(),
        attempts: i32::try_from(task.attempts()).map_err(StoreError::persistence)?,
        last_error: task.last_error().map(str::to_owned),
        created_at: task.created_at().naive_utc(),
        updated_at: task.updated_at().naive_utc(),
    })
}

fn response_to_row(response: &AgentResponse) -> StoreResult<NewResponseRow> {
    Ok(NewResponseRow {
        id: response.id().to_string(),
        task_id: response.task_id().to_string(),
        agent: response.agent().as_str().to_owned(),
        content: response.content().to_owned(),
        confidence: response.confidence().value(),
        citations: serde_json::to_string(response.citations()).map_err(StoreError::persistence)?,
        created_at: response.created_at().naive_utc(),
    })
}

fn row_to_plan(row: PlanRow) -> StoreResult<Plan> {
    let PlanRow {
        id,
        original_query,
        status,
        created_at,
        closed_at,
    } = row;
    Ok(Plan::from_persisted(PersistedPlanData {
        id: parse_id(&id)?,
        original_query,
        status: PlanStatus::try_from(status.as_str()).map_err(StoreError::persistence)?,
        created_at: utc(created_at),
        closed_at: closed_at.map(utc),
    }))
}

fn row_to_task(row: TaskRow) -> StoreResult<Task> {
    let TaskRow {
        id,
        plan_id,
        agent,
        description,
        position,
        state,
        attempts,
        last_error,
        created_at,
        updated_at,
    } = row;
    Ok(Task::from_persisted(PersistedTaskData {
        id: parse_id(&id)?,
        plan_id: parse_id(&plan_id)?,
        agent: AgentId::new(agent).map_err(StoreError::persistence)?,
        description,
        position: u32::try_from(position).map_err(StoreError::persistence)?,
        state: TaskState::try_from(state.as_str()).map_err(StoreError::persistence)?,
        attempts: u32::try_from(attempts).map_err(StoreError::persistence)?,
        last_error,
        created_at: utc(created_at),
        updated_at: utc(updated_at),
    }))
}

fn row_to_response(row: ResponseRow) -> StoreResult<AgentResponse> {
    let ResponseRow {
        sequence: _,
        id,
        task_id,
        agent,
        content,
        confidence,
        citations,
        created_at,
    } = row;
    Ok(AgentResponse::from_persisted(PersistedResponseData {
        id: parse_id::<ResponseId>(&id)?,
        task_id: parse_id(&task_id)?,
        agent: AgentId::new(agent).map_err(StoreError::persistence)?,
        content,
        confidence: Confidence::new(confidence).map_err(StoreError::persistence)?,
        citations: serde_json::from_str(&citations).map_err(StoreError::persistence)?,
        created_at: utc(created_at),
    }))
}

fn row_to_event(row: EventRow) -> StoreResult<Event> {
    let EventRow {
        sequence,
        id,
        plan_id,
        task_id,
        kind,
        payload,
        created_at,
    } = row;
    let event = NewEvent {
        id: parse_id::<EventId>(&id)?,
        plan_id: parse_id(&plan_id)?,
        task_id: task_id.as_deref().map(parse_id::<TaskId>).transpose()?,
        kind: EventKind::try_from(kind.as_str()).map_err(StoreError::persistence)?,
        payload: serde_json::from_str(&payload).map_err(StoreError::persistence)?,
        created_at: utc(created_at),
    };
    let sequence_number = u64::try_from(sequence).map_err(StoreError::persistence)?;
    Ok(Event::from_new(event, sequence_number))
}

fn parse_id<T>(value: &str) -> StoreResult<T>
where
    T: FromStr<Err = uuid::Error>,
{
    T::from_str(value).map_err(StoreError::persistence)
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}
