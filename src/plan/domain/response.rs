//! Agent responses and confidence scoring.

use super::{AgentId, PlanDomainError, ResponseId, TaskId, TaskState};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower bound of the high-confidence band.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// Lower bound of the moderate-confidence band.
pub const MODERATE_CONFIDENCE_THRESHOLD: f64 = 0.50;

/// Confidence score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Creates a confidence score, clamping finite values into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanDomainError::NonFiniteConfidence`] for NaN or infinite
    /// values.
    pub fn new(value: f64) -> Result<Self, PlanDomainError> {
        if !value.is_finite() {
            return Err(PlanDomainError::NonFiniteConfidence);
        }
        Ok(Self(value.clamp(0.0, 1.0)))
    }

    /// Returns the score.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns the band the score falls into.
    #[must_use]
    pub fn band(self) -> ConfidenceBand {
        if self.0 >= HIGH_CONFIDENCE_THRESHOLD {
            ConfidenceBand::High
        } else if self.0 >= MODERATE_CONFIDENCE_THRESHOLD {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Coarse confidence classification used by the escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    /// `>= 0.80`
    High,
    /// `0.50..0.80`
    Moderate,
    /// `< 0.50`; escalates on the final attempt.
    Low,
}

impl ConfidenceBand {
    /// Returns the canonical name of the band.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
        }
    }
}

/// Input for recording an agent response.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAgentResponse {
    /// Task the response answers.
    pub task_id: TaskId,
    /// Agent that produced the response.
    pub agent: AgentId,
    /// Response body.
    pub content: String,
    /// Self-reported confidence.
    pub confidence: Confidence,
    /// Ordered citations backing the content.
    pub citations: Vec<String>,
}

impl NewAgentResponse {
    /// Creates a response payload without citations.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        agent: AgentId,
        content: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            task_id,
            agent,
            content: content.into(),
            confidence,
            citations: Vec::new(),
        }
    }

    /// Sets the citations.
    #[must_use]
    pub fn with_citations(mut self, citations: impl IntoIterator<Item = String>) -> Self {
        self.citations = citations.into_iter().collect();
        self
    }
}

/// A persisted agent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    id: ResponseId,
    task_id: TaskId,
    agent: AgentId,
    content: String,
    confidence: Confidence,
    citations: Vec<String>,
    created_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted response.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedResponseData {
    /// Response identifier.
    pub id: ResponseId,
    /// Task the response answers.
    pub task_id: TaskId,
    /// Agent that produced the response.
    pub agent: AgentId,
    /// Response body.
    pub content: String,
    /// Confidence score.
    pub confidence: Confidence,
    /// Ordered citations.
    pub citations: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AgentResponse {
    /// Stamps a new response with an identifier and creation time.
    #[must_use]
    pub fn new(input: NewAgentResponse, clock: &impl Clock) -> Self {
        Self {
            id: ResponseId::new(),
            task_id: input.task_id,
            agent: input.agent,
            content: input.content,
            confidence: input.confidence,
            citations: input.citations,
            created_at: clock.utc(),
        }
    }

    /// Reconstructs a response from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedResponseData) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            agent: data.agent,
            content: data.content,
            confidence: data.confidence,
            citations: data.citations,
            created_at: data.created_at,
        }
    }

    /// Returns the response identifier.
    #[must_use]
    pub const fn id(&self) -> ResponseId {
        self.id
    }

    /// Returns the task the response answers.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the agent that produced the response.
    #[must_use]
    pub const fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// Returns the response body.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the confidence score.
    #[must_use]
    pub const fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Returns the citations in order.
    #[must_use]
    pub fn citations(&self) -> &[String] {
        &self.citations
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// What recording a response did to its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseDisposition {
    /// The response completed the task.
    Completed,
    /// The task had already failed, escalated or been cancelled; the
    /// response was stored for audit only.
    Retained {
        /// State the task stayed in.
        state: TaskState,
    },
}

/// A stored response together with its effect on the task.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResponse {
    /// The persisted response.
    pub response: AgentResponse,
    /// Effect on the owning task.
    pub disposition: ResponseDisposition,
}

impl RecordedResponse {
    /// Returns `true` when the response completed its task.
    #[must_use]
    pub fn completed_task(&self) -> bool {
        self.disposition == ResponseDisposition::Completed
    }
}
