//! Fixed-collection agent dispatch under a global concurrency cap.
//!
//! One executor instance owns one semaphore; callers that want a shared
//! bound on total concurrent agent executions must share the instance.
//! Batch operations are total: an agent that fails — or whose task panics —
//! contributes a failed [`AgentResult`] instead of aborting the batch.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::agent::SharedAgent;
use crate::result::AgentResult;

/// Errors the dispatch layer itself can raise. Individual agent failures are
/// never surfaced this way; they appear as failed results in the batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// A declared dependency names an agent absent from the plan. Fatal by
    /// policy: a silent skip would produce an incomplete batch that looks
    /// successful.
    #[error("unknown agent in dependency graph: '{0}'")]
    UnknownAgent(String),

    #[error("dependency cycle detected at agent '{0}'")]
    DependencyCycle(String),
}

/// How [`AgentExecutor::execute_plan`] dispatches its agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Parallel,
    Sequential,
    /// Ordered by each agent's declared dependencies rather than list
    /// position.
    Dag,
}

/// A fixed collection of agents plus the dispatch settings to run them with.
#[derive(Clone)]
pub struct ExecutionPlan {
    pub mode: DispatchMode,
    pub agents: Vec<SharedAgent>,
    pub params: Value,
    /// Sequential mode only: stop at the first failed result.
    pub stop_on_error: bool,
    /// Parallel mode only: a cap tighter than the executor's global one.
    pub max_concurrency: Option<usize>,
}

impl ExecutionPlan {
    pub fn new(mode: DispatchMode, agents: Vec<SharedAgent>, params: Value) -> Self {
        Self {
            mode,
            agents,
            params,
            stop_on_error: true,
            max_concurrency: None,
        }
    }

    #[must_use]
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    PartialFailure,
}

/// Outcome of a plan execution: every agent's result plus aggregate counts.
#[derive(Debug)]
pub struct BatchResult {
    pub results: Vec<AgentResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub status: BatchStatus,
}

impl BatchResult {
    fn from_results(results: Vec<AgentResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;
        let status = if failed == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::PartialFailure
        };
        Self {
            results,
            succeeded,
            failed,
            status,
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Dispatches agents under a process-wide concurrency bound.
pub struct AgentExecutor {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

impl Default for AgentExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentExecutor {
    pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

    pub fn new() -> Self {
        Self::with_max_concurrency(Self::DEFAULT_MAX_CONCURRENCY)
    }

    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run one agent while holding a slot of the global semaphore.
    pub async fn execute(&self, agent: SharedAgent, params: Value) -> AgentResult {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return AgentResult::synthetic_failure(
                    agent.name(),
                    "executor semaphore closed".to_string(),
                );
            }
        };
        let result = agent.run(params).await;
        drop(permit);
        result
    }

    /// Run every agent concurrently and gather all results in input order.
    ///
    /// `max_concurrency` layers an additional, tighter cap on top of the
    /// executor's global one. A panicked agent task becomes a synthetic
    /// failed result.
    pub async fn execute_parallel(
        &self,
        agents: &[SharedAgent],
        params: &Value,
        max_concurrency: Option<usize>,
    ) -> Vec<AgentResult> {
        let local_cap = max_concurrency.map(|cap| Arc::new(Semaphore::new(cap.max(1))));

        let handles: Vec<(String, tokio::task::JoinHandle<AgentResult>)> = agents
            .iter()
            .map(|agent| {
                let name = agent.name().to_string();
                let agent = Arc::clone(agent);
                let params = params.clone();
                let global = Arc::clone(&self.semaphore);
                let local = local_cap.clone();

                let handle = tokio::spawn(async move {
                    let _local = match local {
                        Some(semaphore) => match semaphore.acquire_owned().await {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                return AgentResult::synthetic_failure(
                                    agent.name(),
                                    "executor semaphore closed".to_string(),
                                );
                            }
                        },
                        None => None,
                    };
                    let _global = match global.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return AgentResult::synthetic_failure(
                                agent.name(),
                                "executor semaphore closed".to_string(),
                            );
                        }
                    };
                    agent.run(params).await
                });

                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    warn!(agent = %name, %join_error, "agent task aborted");
                    results.push(AgentResult::synthetic_failure(
                        name,
                        format!("agent task aborted: {join_error}"),
                    ));
                }
            }
        }
        results
    }

    /// Run agents one at a time in list order. With `stop_on_error`, a
    /// failed result ends the batch and the partial list is returned.
    pub async fn execute_sequential(
        &self,
        agents: &[SharedAgent],
        params: &Value,
        stop_on_error: bool,
    ) -> Vec<AgentResult> {
        let mut results = Vec::with_capacity(agents.len());

        for agent in agents {
            let result = self.execute(Arc::clone(agent), params.clone()).await;
            let failed = !result.is_success();
            results.push(result);

            if stop_on_error && failed {
                debug!(
                    completed = results.len(),
                    total = agents.len(),
                    "sequential batch stopped on first failure"
                );
                break;
            }
        }
        results
    }

    /// Dispatch a plan according to its mode and fold the results into a
    /// [`BatchResult`].
    pub async fn execute_plan(&self, plan: &ExecutionPlan) -> Result<BatchResult, ExecutorError> {
        let results = match plan.mode {
            DispatchMode::Parallel => {
                self.execute_parallel(&plan.agents, &plan.params, plan.max_concurrency)
                    .await
            }
            DispatchMode::Sequential => {
                self.execute_sequential(&plan.agents, &plan.params, plan.stop_on_error)
                    .await
            }
            DispatchMode::Dag => self.execute_dag(&plan.agents, &plan.params).await?,
        };

        Ok(BatchResult::from_results(results))
    }

    /// Topological execution driven by each agent's declared dependencies.
    ///
    /// Every dependency runs before its dependents, each agent at most once.
    /// An unknown dependency or a cycle is fatal.
    async fn execute_dag(
        &self,
        agents: &[SharedAgent],
        params: &Value,
    ) -> Result<Vec<AgentResult>, ExecutorError> {
        let by_name: HashMap<String, SharedAgent> = agents
            .iter()
            .map(|agent| (agent.name().to_string(), Arc::clone(agent)))
            .collect();

        let mut state = DagState {
            executed: HashSet::new(),
            visiting: HashSet::new(),
            results: Vec::with_capacity(agents.len()),
        };

        for agent in agents {
            self.execute_node(agent.name(), &by_name, params, &mut state)
                .await?;
        }

        Ok(state.results)
    }

    fn execute_node<'a>(
        &'a self,
        name: &'a str,
        by_name: &'a HashMap<String, SharedAgent>,
        params: &'a Value,
        state: &'a mut DagState,
    ) -> BoxFuture<'a, Result<(), ExecutorError>> {
        Box::pin(async move {
            if state.executed.contains(name) {
                return Ok(());
            }
            if !state.visiting.insert(name.to_string()) {
                return Err(ExecutorError::DependencyCycle(name.to_string()));
            }

            let agent = by_name
                .get(name)
                .cloned()
                .ok_or_else(|| ExecutorError::UnknownAgent(name.to_string()))?;

            for dependency in agent.spec().dependencies {
                self.execute_node(&dependency, by_name, params, state).await?;
            }

            let result = self.execute(agent, params.clone()).await;
            state.results.push(result);
            state.visiting.remove(name);
            state.executed.insert(name.to_string());
            Ok(())
        })
    }
}

struct DagState {
    executed: HashSet<String>,
    visiting: HashSet<String>,
    results: Vec<AgentResult>,
}
