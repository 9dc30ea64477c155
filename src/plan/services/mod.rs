//! Orchestration services built on the plan store and capability ports.

pub mod controller;
pub mod policy;
pub mod recovery;
pub mod registry;
pub mod runner;

pub use controller::{ControllerError, ControllerResult, PlanController, PlanSnapshot};
pub use policy::{DEFAULT_EXECUTOR_TIMEOUT, DEFAULT_MAX_ATTEMPTS, RunnerPolicy};
pub use recovery::{
    INTERRUPTED_ERROR, ParseRecoveryPolicyError, RecoveredTask, RecoveryAction, RecoveryPolicy,
    RecoveryReport, recover_interrupted_tasks,
};
pub use registry::ExecutorRegistry;
pub use runner::{OrchestratorRunner, RunOutcome, RunReport, RunnerError, RunnerResult};
