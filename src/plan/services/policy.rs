//! Retry and timeout policy applied by the orchestrator runner.

use crate::plan::domain::Task;
use std::time::Duration;

/// Default number of retries granted to a failing task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default bound on a single executor call.
pub const DEFAULT_EXECUTOR_TIMEOUT: Duration = Duration::from_secs(120);

/// Knobs controlling how the runner treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerPolicy {
    max_attempts: u32,
    executor_timeout: Duration,
}

impl RunnerPolicy {
    /// Creates a policy; `max_attempts` is raised to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, executor_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            executor_timeout,
        }
    }

    /// Returns a copy with a different attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.executor_timeout)
    }

    /// Returns a copy with a different executor timeout.
    #[must_use]
    pub const fn with_executor_timeout(mut self, executor_timeout: Duration) -> Self {
        self.executor_timeout = executor_timeout;
        self
    }

    /// Retries granted before a failing task is escalated.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Bound on a single executor call.
    #[must_use]
    pub const fn executor_timeout(&self) -> Duration {
        self.executor_timeout
    }

    /// Whether `task` may be retried after its current attempt fails.
    ///
    /// `attempts` counts retries already taken; once it reaches the ceiling
    /// the attempt in flight is the final one.
    #[must_use]
    pub const fn has_attempts_remaining(&self, task: &Task) -> bool {
        task.attempts() < self.max_attempts
    }
}

impl Default for RunnerPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_EXECUTOR_TIMEOUT)
    }
}
