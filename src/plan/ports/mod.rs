//! Port contracts for plan orchestration.
//!
//! Ports define infrastructure-agnostic interfaces used by the runner and
//! controller: the durable store and the external capabilities.

pub mod capabilities;
pub mod store;

pub use capabilities::{
    CompletedTaskOutput, DecompositionError, Decomposer, ExecutionError, ExecutionOutput,
    Synthesis, SynthesisError, Synthesizer, TaskExecutor, TaskSpec,
};
pub use store::{
    DEFAULT_EVENT_LIMIT, EventQuery, MAX_EVENT_LIMIT, PlanCancellation, PlanStore, StoreError,
    StoreResult,
};
