//! Declarative workflow definitions and the execution result type.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::memory::TraceEntry;

/// Control-flow rule the engine applies to a workflow's steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Strict list order; `depends_on` is ignored.
    Sequential,
    /// Dependency-driven: a step starts once every step in its `depends_on`
    /// set has completed.
    Parallel,
    /// The whole step list is re-run, up to a fixed iteration cap, until the
    /// mean step confidence crosses the convergence threshold.
    Recursive,
}

/// One named unit within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow.
    pub name: String,
    /// Must resolve in the engine's agent set.
    pub agent_name: String,
    /// May embed `${step_name.field.subfield}` references to prior step
    /// outputs; used verbatim when it contains no markers.
    pub input_template: String,
    /// Gates readiness in parallel mode. Must form a DAG.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Engine-level retry budget for this step (attempts, with exponential
    /// backoff between them).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_name: agent_name.into(),
            input_template: String::new(),
            depends_on: BTreeSet::new(),
            max_retries: default_max_retries(),
        }
    }

    #[must_use]
    pub fn with_input_template(mut self, template: impl Into<String>) -> Self {
        self.input_template = template.into();
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, step_name: impl Into<String>) -> Self {
        self.depends_on.insert(step_name.into());
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// An immutable workflow definition, built by the caller before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    pub mode: ExecutionMode,
    /// Whole-workflow wall-clock bound in seconds; `0` means unbounded.
    #[serde(default)]
    pub timeout_seconds: u64,
}

impl Workflow {
    pub fn new(name: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps: Vec::new(),
            mode,
            timeout_seconds: 0,
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

/// Return value of `OrchestrationEngine::execute_workflow`.
///
/// Always produced, success or failure; callers must inspect `status` and
/// `error`. On failure, `step_results`, `reasoning_trace` and `memory`
/// carry whatever had accumulated before the abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub step_results: HashMap<String, Value>,
    pub reasoning_trace: Vec<TraceEntry>,
    pub memory: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    pub fn step_result(&self, step_name: &str) -> Option<&Value> {
        self.step_results.get(step_name)
    }

    pub fn total_duration_seconds(&self) -> f64 {
        let millis = (self.completed_at - self.started_at).num_milliseconds();
        millis.max(0) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assembles_steps_in_order() {
        let workflow = Workflow::new("analysis", ExecutionMode::Sequential)
            .with_step(WorkflowStep::new("gather", "collector"))
            .with_step(
                WorkflowStep::new("summarize", "summarizer")
                    .with_input_template("${gather.text}")
                    .with_dependency("gather"),
            )
            .with_timeout_seconds(60);

        assert_eq!(workflow.step_names(), vec!["gather", "summarize"]);
        assert_eq!(workflow.timeout_seconds, 60);
        assert!(workflow.steps[1].depends_on.contains("gather"));
    }

    #[test]
    fn workflow_round_trips_through_serde() {
        let workflow = Workflow::new("analysis", ExecutionMode::Parallel)
            .with_step(WorkflowStep::new("gather", "collector").with_max_retries(1));

        let encoded = serde_json::to_string(&workflow).unwrap();
        let decoded: Workflow = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.id, workflow.id);
        assert_eq!(decoded.mode, ExecutionMode::Parallel);
        assert_eq!(decoded.steps[0].max_retries, 1);
    }

    #[test]
    fn missing_step_fields_take_defaults() {
        let step: WorkflowStep =
            serde_json::from_str(r#"{"name":"a","agent_name":"x","input_template":""}"#).unwrap();
        assert!(step.depends_on.is_empty());
        assert_eq!(step.max_retries, 3);
    }
}
