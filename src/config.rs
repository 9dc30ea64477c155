//! Engine configuration loaded from environment variables.
//!
//! Every setting has a default; a value that is present but malformed is an
//! error rather than a silent fallback.

use crate::plan::services::{
    DEFAULT_EXECUTOR_TIMEOUT, DEFAULT_MAX_ATTEMPTS, ParseRecoveryPolicyError, RecoveryPolicy,
    RunnerPolicy,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Selects the store backend.
pub const BACKEND_VAR: &str = "STATE_BACKEND";
/// Path of the `SQLite` database file.
pub const DB_PATH_VAR: &str = "STATE_DB_PATH";
/// Attempt ceiling applied by the runner.
pub const MAX_ATTEMPTS_VAR: &str = "PLANWRIGHT_MAX_ATTEMPTS";
/// Executor timeout in whole seconds.
pub const EXECUTOR_TIMEOUT_VAR: &str = "PLANWRIGHT_EXECUTOR_TIMEOUT_SECS";
/// Crash recovery policy.
pub const RECOVERY_VAR: &str = "PLANWRIGHT_RECOVERY";
/// Fallback log filter when `RUST_LOG` is unset.
pub const LOG_VAR: &str = "PLANWRIGHT_LOG";

/// Default location of the `SQLite` database.
pub const DEFAULT_DB_PATH: &str = "./state/planwright_state.db";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Store backend selected at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// Durable `SQLite` store in WAL mode.
    #[default]
    Sqlite,
    /// Volatile in-memory store, mostly for tests and demos.
    Memory,
}

impl StoreBackend {
    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// Errors raised while reading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable held a value outside its accepted set.
    #[error("{var} has unsupported value '{value}'")]
    Unsupported {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// A numeric variable could not be parsed or was zero.
    #[error("{var} must be a positive integer, got '{value}'")]
    NotPositive {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// A numeric variable exceeded the range its setting accepts.
    #[error("{var} is out of range, got '{value}'")]
    OutOfRange {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// The recovery policy was not recognised.
    #[error("invalid PLANWRIGHT_RECOVERY: {0}")]
    Recovery(#[from] ParseRecoveryPolicyError),

    /// A variable was set to an empty string.
    #[error("{0} is set but empty")]
    Empty(&'static str),
}

/// Settings for the engine and its binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Store backend.
    pub backend: StoreBackend,
    /// `SQLite` database path; ignored by the memory backend.
    pub db_path: PathBuf,
    /// Attempt ceiling before escalation.
    pub max_attempts: u32,
    /// Per-call executor timeout.
    pub executor_timeout: Duration,
    /// What recovery does with interrupted tasks.
    pub recovery: RecoveryPolicy,
    /// Fallback tracing filter.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            executor_timeout: DEFAULT_EXECUTOR_TIMEOUT,
            recovery: RecoveryPolicy::default(),
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let read = |var: &'static str| -> Result<Option<String>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(var)),
                Some(value) => Ok(Some(value.trim().to_owned())),
            }
        };

        let backend = read(BACKEND_VAR)?
            .map(|value| parse_backend(&value))
            .transpose()?
            .unwrap_or(defaults.backend);
        let db_path = read(DB_PATH_VAR)?.map_or(defaults.db_path, PathBuf::from);
        let max_attempts = read(MAX_ATTEMPTS_VAR)?
            .map(|value| parse_attempts(&value))
            .transpose()?
            .unwrap_or(defaults.max_attempts);
        let executor_timeout = read(EXECUTOR_TIMEOUT_VAR)?
            .map(|value| parse_positive(EXECUTOR_TIMEOUT_VAR, &value))
            .transpose()?
            .map_or(defaults.executor_timeout, Duration::from_secs);
        let recovery = read(RECOVERY_VAR)?
            .map(|value| RecoveryPolicy::try_from(value.as_str()))
            .transpose()?
            .unwrap_or(defaults.recovery);
        let log_level = read(LOG_VAR)?.unwrap_or(defaults.log_level);

        Ok(Self {
            backend,
            db_path,
            max_attempts,
            executor_timeout,
            recovery,
            log_level,
        })
    }

    /// Builds the runner policy described by this configuration.
    #[must_use]
    pub fn runner_policy(&self) -> RunnerPolicy {
        RunnerPolicy::new(self.max_attempts, self.executor_timeout)
    }
}

fn parse_backend(value: &str) -> Result<StoreBackend, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "sqlite" => Ok(StoreBackend::Sqlite),
        "memory" => Ok(StoreBackend::Memory),
        _ => Err(ConfigError::Unsupported {
            var: BACKEND_VAR,
            value: value.to_owned(),
        }),
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::NotPositive {
            var,
            value: value.to_owned(),
        }),
    }
}

fn parse_attempts(value: &str) -> Result<u32, ConfigError> {
    let attempts = parse_positive(MAX_ATTEMPTS_VAR, value)?;
    u32::try_from(attempts).map_err(|_| ConfigError::OutOfRange {
        var: MAX_ATTEMPTS_VAR,
        value: value.to_owned(),
    })
}
