//! Diesel row models for plan persistence.

use super::schema::{agent_responses, events, plans, tasks};
use chrono::NaiveDateTime;
use diesel::prelude::*;

/// Query result row for plans.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = plans)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlanRow {
    /// Plan identifier.
    pub id: String,
    /// Goal the plan was created from.
    pub original_query: String,
    /// Plan status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Close or cancel timestamp.
    pub closed_at: Option<NaiveDateTime>,
}

/// Query result row for tasks.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    /// Task identifier.
    pub id: String,
    /// Owning plan.
    pub plan_id: String,
    /// Agent identifier.
    pub agent: String,
    /// Task description.
    pub description: String,
    /// Zero-based order within the plan.
    pub position: i32,
    /// Lifecycle state.
    pub state: String,
    /// Retries performed so far.
    pub attempts: i32,
    /// Error captured by the last failure.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last lifecycle timestamp.
    pub updated_at: NaiveDateTime,
}

/// Query result row for agent responses.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = agent_responses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ResponseRow {
    /// Store-assigned recording order.
    pub sequence: i64,
    /// Response identifier.
    pub id: String,
    /// Task the response answers.
    pub task_id: String,
    /// Agent that produced the response.
    pub agent: String,
    /// Response body.
    pub content: String,
    /// Confidence score.
    pub confidence: f64,
    /// Citations as a JSON array.
    pub citations: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

/// Query result row for events.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventRow {
    /// Store-assigned ordering key.
    pub sequence: i64,
    /// Event identifier.
    pub id: String,
    /// Owning plan.
    pub plan_id: String,
    /// Task the event concerns.
    pub task_id: Option<String>,
    /// Event kind.
    pub kind: String,
    /// JSON payload.
    pub payload: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

/// Insert model for events; the sequence is assigned by `SQLite`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEventRow {
    /// Event identifier.
    pub id: String,
    /// Owning plan.
    pub plan_id: String,
    /// Task the event concerns.
    pub task_id: Option<String>,
    /// Event kind.
    pub kind: String,
    /// JSON payload.
    pub payload: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

/// Insert model for responses; the sequence is assigned by `SQLite`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agent_responses)]
pub struct NewResponseRow {
    /// Response identifier.
    pub id: String,
    /// Task the response answers.
    pub task_id: String,
    /// Agent that produced the response.
    pub agent: String,
    /// Response body.
    pub content: String,
    /// Confidence score.
    pub confidence: f64,
    /// Citations as a JSON array.
    pub citations: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}
