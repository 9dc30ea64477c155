//! Test doubles shared by the plan unit tests.

use crate::plan::{
    domain::{AgentId, PlanId},
    ports::{
        CompletedTaskOutput, DecompositionError, Decomposer, ExecutionError, ExecutionOutput,
        Synthesis, SynthesisError, Synthesizer, TaskExecutor, TaskSpec,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use mockall::mock;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

mock! {
    pub Synthesizer {}

    #[async_trait]
    impl Synthesizer for Synthesizer {
        async fn synthesize(
            &self,
            plan_id: PlanId,
            outputs: Vec<CompletedTaskOutput>,
        ) -> Result<Synthesis, SynthesisError>;
    }
}

pub fn agent(name: &str) -> AgentId {
    AgentId::new(name).expect("valid agent id")
}

pub fn summary_of(outputs: &[CompletedTaskOutput]) -> Synthesis {
    Synthesis {
        summary: outputs
            .iter()
            .map(|output| output.content.as_str())
            .collect::<Vec<_>>()
            .join(" | "),
        risks: Vec::new(),
        confidence: 0.9,
    }
}

/// Clock frozen at one instant, so every record it stamps shares a
/// timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FrozenClock(pub DateTime<Utc>);

impl Default for FrozenClock {
    fn default() -> Self {
        Self(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
                .single()
                .expect("valid instant"),
        )
    }
}

impl Clock for FrozenClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Synthesiser that joins the outputs it receives.
#[derive(Debug, Default)]
pub struct JoiningSynthesizer;

#[async_trait]
impl Synthesizer for JoiningSynthesizer {
    async fn synthesize(
        &self,
        _plan_id: PlanId,
        outputs: Vec<CompletedTaskOutput>,
    ) -> Result<Synthesis, SynthesisError> {
        Ok(summary_of(&outputs))
    }
}

/// Executor that replays a fixed script of results, one per call.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<ExecutionOutput, ExecutionError>>>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(script: impl IntoIterator<Item = Result<ExecutionOutput, ExecutionError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(content: &str, confidence: f64) -> Self {
        Self::new([Ok(ExecutionOutput::new(content, confidence))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn run(
        &self,
        _agent: &AgentId,
        _description: &str,
    ) -> Result<ExecutionOutput, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionError::new("script exhausted")))
    }
}

/// Executor that never answers within the runner's timeout.
#[derive(Debug)]
pub struct StalledExecutor {
    pub delay: Duration,
}

#[async_trait]
impl TaskExecutor for StalledExecutor {
    async fn run(
        &self,
        _agent: &AgentId,
        _description: &str,
    ) -> Result<ExecutionOutput, ExecutionError> {
        tokio::time::sleep(self.delay).await;
        Ok(ExecutionOutput::new("too late", 0.95))
    }
}

/// Executor that parks mid-call until the test releases it.
#[derive(Debug, Default)]
pub struct GatedExecutor {
    pub started: Notify,
    pub release: Notify,
}

#[async_trait]
impl TaskExecutor for GatedExecutor {
    async fn run(
        &self,
        _agent: &AgentId,
        _description: &str,
    ) -> Result<ExecutionOutput, ExecutionError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(ExecutionOutput::new("finished after release", 0.95))
    }
}

/// Decomposer returning a fixed task list.
#[derive(Debug, Default)]
pub struct FixedDecomposer {
    pub tasks: Vec<(String, String)>,
}

impl FixedDecomposer {
    pub fn new<'a>(tasks: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            tasks: tasks
                .into_iter()
                .map(|(agent, description)| (agent.to_owned(), description.to_owned()))
                .collect(),
        }
    }
}

#[async_trait]
impl Decomposer for FixedDecomposer {
    async fn decompose(&self, _query: &str) -> Result<Vec<TaskSpec>, DecompositionError> {
        Ok(self
            .tasks
            .iter()
            .map(|(name, description)| TaskSpec::new(agent(name), description.clone()))
            .collect())
    }
}

/// Decomposer that always rejects the goal.
#[derive(Debug, Default)]
pub struct RejectingDecomposer;

#[async_trait]
impl Decomposer for RejectingDecomposer {
    async fn decompose(&self, query: &str) -> Result<Vec<TaskSpec>, DecompositionError> {
        Err(DecompositionError::Rejected(format!("cannot plan '{query}'")))
    }
}
