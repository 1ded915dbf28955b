//! The orchestration engine: declarative workflow execution over an injected
//! agent set.
//!
//! `execute_workflow` is total. Individual agent failures are absorbed by the
//! per-step retry wrapper; anything unrecoverable (unknown agent, deadlock,
//! exhausted step retries, workflow timeout) aborts the run and comes back as
//! a failed [`WorkflowResult`] carrying the partial trace and memory.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use swarm_agent::{AgentResult, SharedAgent};

use crate::memory::AgentMemory;
use crate::template::resolve_template;
use crate::workflow::{ExecutionMode, Workflow, WorkflowResult, WorkflowStatus, WorkflowStep};

/// Unrecoverable orchestration-level failures. These abort the workflow;
/// `execute_workflow` converts them into a failed result rather than
/// propagating.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A step references an agent absent from the engine's set. Fatal in all
    /// modes: a silent skip would produce an incomplete result that looks
    /// successful.
    #[error("step '{step}' references unknown agent '{agent}'")]
    UnknownAgent { step: String, agent: String },

    /// Parallel mode cannot make progress: the listed steps have
    /// dependencies that can never be satisfied (cycle or dangling name).
    #[error("deadlock: steps {0:?} can never become ready")]
    Deadlock(Vec<String>),

    #[error("step '{step}' failed after {attempts} attempts: {error}")]
    StepFailed {
        step: String,
        attempts: u32,
        error: String,
    },

    #[error("workflow exceeded its timeout of {0}s")]
    Timeout(u64),
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Iteration cap for recursive mode.
    pub max_recursive_iterations: u32,
    /// Mean step confidence at which recursive mode stops early.
    pub convergence_threshold: f64,
    /// Base delay for the per-step retry wrapper; attempt `n` waits
    /// `base * 2^n` before the next try.
    pub retry_backoff_base: Duration,
    /// Whether `Workflow::timeout_seconds` bounds the whole run.
    pub enforce_workflow_timeout: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recursive_iterations: 10,
            convergence_threshold: 0.95,
            retry_backoff_base: Duration::from_secs(1),
            enforce_workflow_timeout: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_recursive_iterations(mut self, cap: u32) -> Self {
        self.max_recursive_iterations = cap.max(1);
        self
    }

    #[must_use]
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_retry_backoff_base(mut self, base: Duration) -> Self {
        self.retry_backoff_base = base;
        self
    }

    #[must_use]
    pub fn with_workflow_timeout_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_workflow_timeout = enforce;
        self
    }
}

/// Executes declarative workflows against a fixed, injected agent set.
///
/// The agent map is wired at construction; there is no runtime discovery.
/// One engine may run many workflows, each with its own [`AgentMemory`].
pub struct OrchestrationEngine {
    agents: HashMap<String, SharedAgent>,
    config: EngineConfig,
    active: DashMap<Uuid, String>,
}

impl OrchestrationEngine {
    pub fn new(agents: HashMap<String, SharedAgent>) -> Self {
        Self::with_config(agents, EngineConfig::default())
    }

    pub fn with_config(agents: HashMap<String, SharedAgent>, config: EngineConfig) -> Self {
        Self {
            agents,
            config,
            active: DashMap::new(),
        }
    }

    /// Sorted names of the agents this engine can dispatch to.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ids of workflows currently executing on this engine.
    pub fn active_workflows(&self) -> Vec<Uuid> {
        self.active.iter().map(|entry| *entry.key()).collect()
    }

    /// Remove a workflow id from the active bookkeeping.
    ///
    /// Known limitation: this does not interrupt in-flight tasks; the run
    /// continues to completion and its result is still produced. Returns
    /// whether the id was present.
    pub fn cancel_workflow(&self, workflow_id: Uuid) -> bool {
        self.active.remove(&workflow_id).is_some()
    }

    /// Execute a workflow to completion under its execution mode.
    ///
    /// Always returns a [`WorkflowResult`]; inspect `status` and `error` for
    /// failure. `initial_context` seeds the run's shared memory.
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
        initial_context: Option<HashMap<String, Value>>,
    ) -> WorkflowResult {
        let started_at = Utc::now();
        self.active.insert(workflow.id, workflow.name.clone());
        info!(
            workflow = %workflow.name,
            id = %workflow.id,
            mode = ?workflow.mode,
            steps = workflow.steps.len(),
            "workflow execution started"
        );

        let mut memory = match initial_context {
            Some(context) => AgentMemory::with_context(context),
            None => AgentMemory::new(),
        };
        let mut step_results: HashMap<String, Value> = HashMap::new();

        let bounded = self.config.enforce_workflow_timeout && workflow.timeout_seconds > 0;
        let outcome = if bounded {
            match timeout(
                Duration::from_secs(workflow.timeout_seconds),
                self.run_mode(workflow, &mut memory, &mut step_results),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(OrchestrationError::Timeout(workflow.timeout_seconds)),
            }
        } else {
            self.run_mode(workflow, &mut memory, &mut step_results).await
        };

        self.active.remove(&workflow.id);

        let (status, error) = match outcome {
            Ok(()) => {
                info!(workflow = %workflow.name, id = %workflow.id, "workflow completed");
                (WorkflowStatus::Completed, None)
            }
            Err(cause) => {
                warn!(workflow = %workflow.name, id = %workflow.id, error = %cause, "workflow failed");
                (WorkflowStatus::Failed, Some(cause.to_string()))
            }
        };

        WorkflowResult {
            workflow_id: workflow.id,
            status,
            step_results,
            reasoning_trace: memory.reasoning_trace().to_vec(),
            memory: memory.context().clone(),
            started_at,
            completed_at: Utc::now(),
            error,
        }
    }

    async fn run_mode(
        &self,
        workflow: &Workflow,
        memory: &mut AgentMemory,
        step_results: &mut HashMap<String, Value>,
    ) -> Result<(), OrchestrationError> {
        match workflow.mode {
            ExecutionMode::Sequential => self.run_sequential(workflow, memory, step_results).await,
            ExecutionMode::Parallel => self.run_parallel(workflow, memory, step_results).await,
            ExecutionMode::Recursive => self.run_recursive(workflow, memory, step_results).await,
        }
    }

    /// Strict list order; `depends_on` is ignored.
    async fn run_sequential(
        &self,
        workflow: &Workflow,
        memory: &mut AgentMemory,
        step_results: &mut HashMap<String, Value>,
    ) -> Result<(), OrchestrationError> {
        for step in &workflow.steps {
            self.run_step(step, memory, step_results).await?;
        }
        Ok(())
    }

    /// Ready-set loop: launch every step whose dependencies have completed,
    /// await the wave, fold the results, repeat. An empty ready set with
    /// steps remaining is a deadlock and fails fast instead of hanging.
    async fn run_parallel(
        &self,
        workflow: &Workflow,
        memory: &mut AgentMemory,
        step_results: &mut HashMap<String, Value>,
    ) -> Result<(), OrchestrationError> {
        let mut completed: HashSet<String> = HashSet::new();
        let mut remaining: Vec<&WorkflowStep> = workflow.steps.iter().collect();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&WorkflowStep>, Vec<&WorkflowStep>) =
                remaining.into_iter().partition(|step| {
                    step.depends_on
                        .iter()
                        .all(|dependency| completed.contains(dependency))
                });

            if ready.is_empty() {
                let mut stuck: Vec<String> =
                    blocked.iter().map(|step| step.name.clone()).collect();
                stuck.sort();
                return Err(OrchestrationError::Deadlock(stuck));
            }

            debug!(
                wave = ready.len(),
                blocked = blocked.len(),
                "launching ready steps"
            );

            // Templates resolve against the results available when the wave
            // launches; siblings in one wave do not see each other's output.
            let prepared: Vec<(&WorkflowStep, Value)> = ready
                .iter()
                .map(|step| (*step, self.build_params(step, memory, step_results)))
                .collect();

            let waves = prepared.into_iter().map(|(step, params)| async move {
                let outcome = self
                    .execute_agent_with_retry(&step.agent_name, &step.name, params, step.max_retries)
                    .await;
                (step, outcome)
            });

            for (step, outcome) in join_all(waves).await {
                let result = outcome?;
                self.record_step(step, result, memory, step_results);
                completed.insert(step.name.clone());
            }

            remaining = blocked;
        }

        Ok(())
    }

    /// Re-run the whole step list against the accumulating results until the
    /// mean reported confidence crosses the threshold or the iteration cap
    /// is hit. Non-convergence is not a failure; the last iteration's
    /// results stand.
    async fn run_recursive(
        &self,
        workflow: &Workflow,
        memory: &mut AgentMemory,
        step_results: &mut HashMap<String, Value>,
    ) -> Result<(), OrchestrationError> {
        for iteration in 1..=self.config.max_recursive_iterations {
            for step in &workflow.steps {
                self.run_step(step, memory, step_results).await?;
            }

            let aggregate =
                memory.mean_confidence(workflow.steps.iter().map(|step| step.name.as_str()));
            debug!(iteration, aggregate, "recursive pass finished");

            if aggregate >= self.config.convergence_threshold {
                info!(iteration, aggregate, "recursive workflow converged");
                return Ok(());
            }
        }

        info!(
            cap = self.config.max_recursive_iterations,
            "recursive workflow hit the iteration cap; keeping the last pass's results"
        );
        Ok(())
    }

    async fn run_step(
        &self,
        step: &WorkflowStep,
        memory: &mut AgentMemory,
        step_results: &mut HashMap<String, Value>,
    ) -> Result<(), OrchestrationError> {
        let params = self.build_params(step, memory, step_results);
        let result = self
            .execute_agent_with_retry(&step.agent_name, &step.name, params, step.max_retries)
            .await?;
        self.record_step(step, result, memory, step_results);
        Ok(())
    }

    /// Resolved template as `input`, current shared context as `context`.
    fn build_params(
        &self,
        step: &WorkflowStep,
        memory: &AgentMemory,
        step_results: &HashMap<String, Value>,
    ) -> Value {
        let input = resolve_template(&step.input_template, step_results);
        json!({
            "input": input,
            "context": memory.context(),
        })
    }

    /// Look up the step's agent and run it up to `max_retries` times with
    /// exponential backoff between failed attempts.
    async fn execute_agent_with_retry(
        &self,
        agent_name: &str,
        step_name: &str,
        params: Value,
        max_retries: u32,
    ) -> Result<AgentResult, OrchestrationError> {
        let agent = self
            .agents
            .get(agent_name)
            .cloned()
            .ok_or_else(|| OrchestrationError::UnknownAgent {
                step: step_name.to_string(),
                agent: agent_name.to_string(),
            })?;

        let attempts = max_retries.max(1);
        let mut last_error = String::from("no attempt was made");

        for attempt in 0..attempts {
            let result = agent.run(params.clone()).await;
            if result.is_success() {
                return Ok(result);
            }

            last_error = result
                .error
                .unwrap_or_else(|| "agent reported failure without detail".to_string());

            if attempt + 1 < attempts {
                let delay = self.config.retry_backoff_base * 2u32.pow(attempt);
                warn!(
                    step = step_name,
                    agent = agent_name,
                    attempt = attempt + 1,
                    ?delay,
                    error = %last_error,
                    "step attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }

        Err(OrchestrationError::StepFailed {
            step: step_name.to_string(),
            attempts,
            error: last_error,
        })
    }

    /// Fold a completed step into the run state: output into `step_results`
    /// and shared context, an audit entry into the trace, and the reported
    /// confidence (if any) into the score map.
    fn record_step(
        &self,
        step: &WorkflowStep,
        result: AgentResult,
        memory: &mut AgentMemory,
        step_results: &mut HashMap<String, Value>,
    ) {
        let data = result.data.unwrap_or(Value::Null);

        if let Some(confidence) = data.get("confidence").and_then(Value::as_f64) {
            memory.set_confidence(&step.name, confidence);
        }

        memory.record_trace(&step.name, &step.agent_name, data.clone());
        memory.set(step.name.clone(), data.clone());
        step_results.insert(step.name.clone(), data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_clamps_inputs() {
        let config = EngineConfig::new()
            .with_max_recursive_iterations(0)
            .with_convergence_threshold(1.5);

        assert_eq!(config.max_recursive_iterations, 1);
        assert_eq!(config.convergence_threshold, 1.0);
    }

    #[tokio::test]
    async fn empty_agent_set_fails_on_first_step() {
        let engine = OrchestrationEngine::new(HashMap::new());
        let workflow = Workflow::new("lonely", ExecutionMode::Sequential)
            .with_step(WorkflowStep::new("step", "ghost"));

        let result = engine.execute_workflow(&workflow, None).await;

        assert!(!result.is_success());
        assert!(result.error.unwrap().contains("unknown agent 'ghost'"));
        assert!(engine.active_workflows().is_empty());
    }

    #[tokio::test]
    async fn cancel_workflow_only_clears_bookkeeping() {
        let engine = OrchestrationEngine::new(HashMap::new());
        assert!(!engine.cancel_workflow(Uuid::new_v4()));
    }
}
