//! Per-invocation outcome record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AgentError;

/// Run state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of one [`crate::Agent::run`] call. Immutable after construction.
///
/// Exactly one of `data` (with `status == Completed`) or `error` (with
/// `status == Failed`) is populated, barring cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub execution_id: Uuid,
    pub status: AgentStatus,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl AgentResult {
    /// Build a successful result carrying the agent's output payload.
    pub fn completed(
        agent_name: impl Into<String>,
        execution_id: Uuid,
        data: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            execution_id,
            status: AgentStatus::Completed,
            data: Some(data),
            error: None,
            started_at,
            completed_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Build a failed result carrying the surfaced error.
    pub fn failed(
        agent_name: impl Into<String>,
        execution_id: Uuid,
        error: &AgentError,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            execution_id,
            status: AgentStatus::Failed,
            data: None,
            error: Some(error.to_string()),
            started_at,
            completed_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Synthetic failure for an agent whose task never produced a result,
    /// e.g. a panicked spawn. Used by the executor so batch operations stay
    /// total.
    pub fn synthetic_failure(agent_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_name: agent_name.into(),
            execution_id: Uuid::new_v4(),
            status: AgentStatus::Failed,
            data: None,
            error: Some(reason.into()),
            started_at: now,
            completed_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Completed
    }

    /// Wall-clock duration of the run in seconds.
    pub fn duration_seconds(&self) -> f64 {
        let millis = (self.completed_at - self.started_at).num_milliseconds();
        millis.max(0) as f64 / 1000.0
    }
}
