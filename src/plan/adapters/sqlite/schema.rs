//! Diesel schema for plan orchestration persistence.

diesel::table! {
    /// Plans created from submitted goals.
    plans (id) {
        /// Plan identifier (UUID text).
        id -> Text,
        /// Goal the plan was created from.
        original_query -> Text,
        /// Plan status.
        status -> Text,
        /// Creation timestamp (UTC).
        created_at -> Timestamp,
        /// When the plan was closed or cancelled (UTC).
        closed_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    /// Tasks owned by plans.
    tasks (id) {
        /// Task identifier (UUID text).
        id -> Text,
        /// Owning plan.
        plan_id -> Text,
        /// Agent identifier.
        agent -> Text,
        /// Task description.
        description -> Text,
        /// Zero-based order within the plan.
        position -> Integer,
        /// Lifecycle state.
        state -> Text,
        /// Retries performed so far.
        attempts -> Integer,
        /// Error captured by the last failure.
        last_error -> Nullable<Text>,
        /// Creation timestamp (UTC).
        created_at -> Timestamp,
        /// Last lifecycle timestamp (UTC).
        updated_at -> Timestamp,
    }
}

diesel::table! {
    /// Responses recorded for tasks.
    agent_responses (sequence) {
        /// Store-assigned recording order.
        sequence -> BigInt,
        /// Response identifier (UUID text).
        id -> Text,
        /// Task the response answers.
        task_id -> Text,
        /// Agent that produced the response.
        agent -> Text,
        /// Response body.
        content -> Text,
        /// Confidence score in `[0, 1]`.
        confidence -> Double,
        /// Citations as a JSON array.
        citations -> Text,
        /// Creation timestamp (UTC).
        created_at -> Timestamp,
    }
}

diesel::table! {
    /// Append-only audit log.
    events (sequence) {
        /// Store-assigned ordering key.
        sequence -> BigInt,
        /// Event identifier (UUID text).
        id -> Text,
        /// Owning plan.
        plan_id -> Text,
        /// Task the event concerns.
        task_id -> Nullable<Text>,
        /// Event kind.
        kind -> Text,
        /// JSON payload.
        payload -> Text,
        /// Creation timestamp (UTC).
        created_at -> Timestamp,
    }
}

diesel::joinable!(tasks -> plans (plan_id));
diesel::joinable!(agent_responses -> tasks (task_id));

diesel::allow_tables_to_appear_in_same_query!(plans, tasks, agent_responses, events);

/// DDL applied when a store is opened.
///
/// Update and delete triggers keep the event log append-only.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY NOT NULL,
    original_query TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('open', 'closed', 'cancelled')),
    created_at TIMESTAMP NOT NULL,
    closed_at TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    plan_id TEXT NOT NULL REFERENCES plans (id),
    agent TEXT NOT NULL,
    description TEXT NOT NULL,
    position INTEGER NOT NULL,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
    last_error TEXT,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    UNIQUE (plan_id, position)
);

CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks (state);

CREATE TABLE IF NOT EXISTS agent_responses (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    task_id TEXT NOT NULL REFERENCES tasks (id),
    agent TEXT NOT NULL,
    content TEXT NOT NULL,
    confidence DOUBLE NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    citations TEXT NOT NULL DEFAULT '[]',
    created_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agent_responses_task ON agent_responses (task_id);

CREATE TABLE IF NOT EXISTS events (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    plan_id TEXT NOT NULL REFERENCES plans (id),
    task_id TEXT REFERENCES tasks (id),
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_plan ON events (plan_id, sequence);

CREATE TRIGGER IF NOT EXISTS events_append_only_update
BEFORE UPDATE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;

CREATE TRIGGER IF NOT EXISTS events_append_only_delete
BEFORE DELETE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;
";
