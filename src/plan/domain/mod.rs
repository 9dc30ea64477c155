//! Domain model for plans, tasks and their lifecycle.
//!
//! Everything here is pure: aggregates validate and apply transitions and
//! build the audit events that describe them, while persistence and
//! scheduling live outside the domain boundary.

mod error;
mod event;
mod ids;
mod plan;
mod response;
mod state;
mod task;

pub use error::{
    ParseEventKindError, ParsePlanStatusError, ParseTaskStateError, PlanDomainError,
};
pub use event::{Event, EventKind, NewEvent};
pub use ids::{AgentId, EventId, PlanId, ResponseId, TaskId};
pub use plan::{PersistedPlanData, Plan};
pub use response::{
    AgentResponse, Confidence, ConfidenceBand, HIGH_CONFIDENCE_THRESHOLD,
    MODERATE_CONFIDENCE_THRESHOLD, NewAgentResponse, PersistedResponseData, RecordedResponse,
    ResponseDisposition,
};
pub use state::{PlanStatus, TaskState};
pub use task::{PersistedTaskData, RetryApproval, Task};
