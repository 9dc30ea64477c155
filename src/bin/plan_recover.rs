//! Resolves tasks left `in_progress` by a crash or restart.
//!
//! Usage:
//!
//! ```text
//! STATE_DB_PATH=./state/planwright_state.db PLANWRIGHT_RECOVERY=requeue plan_recover
//! ```
//!
//! Configuration comes from the environment (see [`planwright::config`]).
//! Each interrupted task is marked failed with `last_error = "interrupted"`
//! and, under the `requeue` policy, moved back to `pending` when it still
//! has attempts left. Plans that received requeued tasks are listed so an
//! operator or supervisor can resume them.

use planwright::config::{EngineConfig, StoreBackend};
use planwright::plan::adapters::sqlite::SqlitePlanStore;
use planwright::plan::ports::PlanStore;
use planwright::plan::services::{RecoveryAction, recover_interrupted_tasks};
use planwright::telemetry::init_tracing;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = EngineConfig::from_env()?;
    init_tracing(&config.log_level);

    match config.backend {
        StoreBackend::Sqlite => {
            let path = config.db_path.clone();
            let store = tokio::task::spawn_blocking(move || SqlitePlanStore::open(path)).await??;
            tracing::info!(db_path = %config.db_path.display(), "opened plan store");
            recover(&store, &config).await
        }
        StoreBackend::Memory => {
            tracing::info!("memory backend holds no state across restarts; nothing to recover");
            Ok(())
        }
    }
}

async fn recover(store: &impl PlanStore, config: &EngineConfig) -> Result<(), BoxError> {
    let report =
        recover_interrupted_tasks(store, config.recovery, config.runner_policy()).await?;

    for task in &report.tasks {
        tracing::info!(
            plan_id = %task.plan_id,
            task_id = %task.task_id,
            action = task.action.as_str(),
            "interrupted task resolved"
        );
    }
    for plan_id in report.plans_to_resume() {
        tracing::info!(plan_id = %plan_id, "plan ready to resume");
    }
    tracing::info!(
        policy = %config.recovery,
        found = report.tasks.len(),
        marked_failed = report.count(RecoveryAction::MarkedFailed),
        requeued = report.count(RecoveryAction::Requeued),
        skipped = report.count(RecoveryAction::SkippedPlanNotOpen)
            + report.count(RecoveryAction::SkippedChanged),
        "recovery complete"
    );
    Ok(())
}
