//! The agent contract and its lifecycle driver.
//!
//! A concrete agent implements [`Agent::execute`] (and usually [`Agent::name`]
//! via a stored [`AgentSpec`]); everything else — validation, initialization,
//! bounded retry with a per-attempt timeout, hooks, cleanup — is driven by the
//! provided [`Agent::run`] method. `run` is total: it always returns an
//! [`AgentResult`], never an error.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::hooks::AgentHooks;
use crate::result::{AgentResult, AgentStatus};

/// Immutable identity and retry/timeout policy of an agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub category: String,
    pub version: String,
    pub author: String,
    pub tags: BTreeSet<String>,
    /// Names of other agents this one depends on. Only consulted by DAG
    /// dispatch in the executor.
    pub dependencies: Vec<String>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Total number of attempts (not retries after the first).
    pub retry_count: u32,
    /// Constant delay between attempts. No backoff multiplier at this level;
    /// the orchestration engine applies its own backoff between step retries.
    pub retry_delay: Duration,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: "general".to_string(),
            version: "0.1.0".to_string(),
            author: String::new(),
            tags: BTreeSet::new(),
            dependencies: Vec::new(),
            timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, agent_name: impl Into<String>) -> Self {
        self.dependencies.push(agent_name.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct StateInner {
    status: AgentStatus,
    execution_id: Option<Uuid>,
}

/// Mutable run state an agent may expose for observability.
///
/// Updated by [`Agent::run`]; the scheduler itself never reads it back — the
/// returned [`AgentResult`] is authoritative.
#[derive(Debug)]
pub struct AgentState {
    inner: Mutex<StateInner>,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                status: AgentStatus::Idle,
                execution_id: None,
            }),
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.inner.lock().expect("agent state poisoned").status
    }

    pub fn current_execution(&self) -> Option<Uuid> {
        self.inner.lock().expect("agent state poisoned").execution_id
    }

    fn begin(&self, execution_id: Uuid) {
        let mut inner = self.inner.lock().expect("agent state poisoned");
        inner.status = AgentStatus::Running;
        inner.execution_id = Some(execution_id);
    }

    fn finish(&self, status: AgentStatus) {
        let mut inner = self.inner.lock().expect("agent state poisoned");
        inner.status = status;
        inner.execution_id = None;
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

/// The uniform unit-of-work contract.
///
/// `execute` is the only method a concrete agent must implement beyond
/// `name`. Agents are constructed once and reused across many `run`
/// invocations; `execute` must be idempotent with respect to orchestration.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique, stable name within a registry or engine.
    fn name(&self) -> &str;

    /// Identity and retry/timeout policy. Override when the agent stores a
    /// customized [`AgentSpec`].
    fn spec(&self) -> AgentSpec {
        AgentSpec::new(self.name())
    }

    /// Optional mutable run state for observability.
    fn state(&self) -> Option<&AgentState> {
        None
    }

    /// Optional lifecycle callbacks.
    fn hooks(&self) -> Option<&AgentHooks> {
        None
    }

    /// Parameter gate checked before any execution attempt. Rejection fails
    /// the run with a validation error and is never retried.
    fn validate_params(&self, _params: &Value) -> bool {
        true
    }

    /// Called at the start of every run. No-op by default.
    async fn initialize(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Called at the end of every run, on all exit paths. No-op by default.
    async fn cleanup(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// The agent's work. Invoked under the retry/timeout policy of
    /// [`AgentSpec`]; must not be called directly by orchestration code.
    async fn execute(&self, params: Value) -> Result<Value, AgentError>;

    /// Full lifecycle driver. Not meant to be overridden.
    ///
    /// Validate → initialize → up to `retry_count` attempts, each bounded by
    /// `timeout`, with a constant `retry_delay` between attempts → cleanup.
    /// Cleanup runs on every exit path; a cleanup or hook failure is logged
    /// and swallowed.
    async fn run(&self, params: Value) -> AgentResult {
        let spec = self.spec();
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();

        debug!(agent = %spec.name, %execution_id, "agent run started");
        if let Some(state) = self.state() {
            state.begin(execution_id);
        }
        if let Some(hooks) = self.hooks() {
            hooks.fire_before_execute(&spec.name, &params);
        }

        if !self.validate_params(&params) {
            let error = AgentError::Validation(format!(
                "agent '{}' rejected the supplied parameters",
                spec.name
            ));
            return finish_failure(self, &spec, execution_id, error, started_at).await;
        }

        if let Err(cause) = self.initialize().await {
            let error = AgentError::Initialization(cause.to_string());
            return finish_failure(self, &spec, execution_id, error, started_at).await;
        }

        let attempts = spec.retry_count.max(1);
        let mut last_error = AgentError::Execution("no attempt was made".to_string());

        for attempt in 0..attempts {
            match timeout(spec.timeout, self.execute(params.clone())).await {
                Ok(Ok(data)) => {
                    return finish_success(self, &spec, execution_id, data, started_at).await;
                }
                Ok(Err(error)) => {
                    let retryable = error.is_retryable();
                    last_error = error;
                    if !retryable {
                        break;
                    }
                }
                Err(_) => {
                    last_error = AgentError::Timeout(spec.timeout.as_secs_f64());
                }
            }

            if attempt + 1 < attempts {
                debug!(
                    agent = %spec.name,
                    attempt = attempt + 1,
                    error = %last_error,
                    "attempt failed; retrying after delay"
                );
                sleep(spec.retry_delay).await;
            }
        }

        finish_failure(self, &spec, execution_id, last_error, started_at).await
    }
}

pub type SharedAgent = std::sync::Arc<dyn Agent>;

async fn finish_success<A: Agent + ?Sized>(
    agent: &A,
    spec: &AgentSpec,
    execution_id: Uuid,
    data: Value,
    started_at: DateTime<Utc>,
) -> AgentResult {
    run_cleanup(agent, &spec.name).await;
    if let Some(state) = agent.state() {
        state.finish(AgentStatus::Completed);
    }

    let result = AgentResult::completed(&spec.name, execution_id, data, started_at);
    if let Some(hooks) = agent.hooks() {
        hooks.fire_on_success(&spec.name, &result);
        hooks.fire_after_execute(&spec.name, &result);
    }
    debug!(agent = %spec.name, %execution_id, "agent run completed");
    result
}

async fn finish_failure<A: Agent + ?Sized>(
    agent: &A,
    spec: &AgentSpec,
    execution_id: Uuid,
    error: AgentError,
    started_at: DateTime<Utc>,
) -> AgentResult {
    run_cleanup(agent, &spec.name).await;
    if let Some(state) = agent.state() {
        state.finish(AgentStatus::Failed);
    }

    if let Some(hooks) = agent.hooks() {
        hooks.fire_on_error(&spec.name, &error);
    }
    let result = AgentResult::failed(&spec.name, execution_id, &error, started_at);
    if let Some(hooks) = agent.hooks() {
        hooks.fire_after_execute(&spec.name, &result);
    }
    warn!(agent = %spec.name, %execution_id, %error, "agent run failed");
    result
}

async fn run_cleanup<A: Agent + ?Sized>(agent: &A, name: &str) {
    if let Err(error) = agent.cleanup().await {
        warn!(agent = name, %error, "cleanup failed; continuing");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use serde_json::json;

    use super::*;

    /// Fails the first `fail_until` attempts, then succeeds.
    struct FlakyAgent {
        spec: AgentSpec,
        attempts: Arc<AtomicUsize>,
        fail_until: usize,
    }

    #[async_trait]
    impl Agent for FlakyAgent {
        fn name(&self) -> &str {
            &self.spec.name
        }

        fn spec(&self) -> AgentSpec {
            self.spec.clone()
        }

        async fn execute(&self, _params: Value) -> Result<Value, AgentError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_until {
                return Err(AgentError::Execution("transient failure".to_string()));
            }
            Ok(json!({ "attempt": attempt }))
        }
    }

    /// Sleeps longer than any reasonable test timeout.
    struct SlowAgent {
        spec: AgentSpec,
    }

    #[async_trait]
    impl Agent for SlowAgent {
        fn name(&self) -> &str {
            &self.spec.name
        }

        fn spec(&self) -> AgentSpec {
            self.spec.clone()
        }

        async fn execute(&self, _params: Value) -> Result<Value, AgentError> {
            sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    /// Records lifecycle transitions in order.
    struct LifecycleAgent {
        spec: AgentSpec,
        state: AgentState,
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
        should_fail: bool,
        require_input: bool,
    }

    impl LifecycleAgent {
        fn new(should_fail: bool, require_input: bool) -> Self {
            Self {
                spec: AgentSpec::new("lifecycle")
                    .with_retry_count(1)
                    .with_retry_delay(Duration::ZERO),
                state: AgentState::new(),
                log: Arc::new(std::sync::Mutex::new(Vec::new())),
                should_fail,
                require_input,
            }
        }

        fn push(&self, event: &'static str) {
            self.log.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl Agent for LifecycleAgent {
        fn name(&self) -> &str {
            &self.spec.name
        }

        fn spec(&self) -> AgentSpec {
            self.spec.clone()
        }

        fn state(&self) -> Option<&AgentState> {
            Some(&self.state)
        }

        fn validate_params(&self, params: &Value) -> bool {
            !self.require_input || params.get("input").is_some()
        }

        async fn initialize(&self) -> Result<(), AgentError> {
            self.push("initialize");
            Ok(())
        }

        async fn cleanup(&self) -> Result<(), AgentError> {
            self.push("cleanup");
            Ok(())
        }

        async fn execute(&self, _params: Value) -> Result<Value, AgentError> {
            self.push("execute");
            if self.should_fail {
                Err(AgentError::Execution("scripted failure".to_string()))
            } else {
                Ok(json!({ "ok": true }))
            }
        }
    }

    fn fast_spec(name: &str, retry_count: u32) -> AgentSpec {
        AgentSpec::new(name)
            .with_retry_count(retry_count)
            .with_retry_delay(Duration::from_millis(5))
            .with_timeout(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn always_failing_agent_is_attempted_exactly_retry_count_times() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let agent = FlakyAgent {
            spec: fast_spec("always-fails", 3),
            attempts: Arc::clone(&attempts),
            fail_until: usize::MAX,
        };

        let result = agent.run(json!({})).await;

        assert_eq!(result.status, AgentStatus::Failed);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(result.error.unwrap().contains("transient failure"));
    }

    #[tokio::test]
    async fn flaky_agent_succeeds_within_retry_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let agent = FlakyAgent {
            spec: fast_spec("flaky", 3),
            attempts: Arc::clone(&attempts),
            fail_until: 2,
        };

        let result = agent.run(json!({})).await;

        assert!(result.is_success());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(result.data.unwrap()["attempt"], 3);
    }

    #[tokio::test]
    async fn timeout_produces_failed_result_within_bound() {
        let agent = SlowAgent {
            spec: AgentSpec::new("slow")
                .with_timeout(Duration::from_millis(30))
                .with_retry_count(2)
                .with_retry_delay(Duration::from_millis(10)),
        };

        let started = Instant::now();
        let result = agent.run(json!({})).await;
        let elapsed = started.elapsed();

        assert_eq!(result.status, AgentStatus::Failed);
        assert!(result.error.unwrap().contains("timeout"));
        // 2 * 30ms timeout + 1 * 10ms delay, with generous scheduling slack.
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn validation_failure_skips_execute_but_runs_cleanup() {
        let agent = LifecycleAgent::new(false, true);

        let result = agent.run(json!({ "unrelated": 1 })).await;

        assert_eq!(result.status, AgentStatus::Failed);
        assert!(result.error.unwrap().contains("invalid parameters"));
        assert_eq!(*agent.log.lock().unwrap(), vec!["cleanup"]);
        assert_eq!(agent.state.status(), AgentStatus::Failed);
    }

    #[tokio::test]
    async fn cleanup_runs_on_success_and_failure() {
        let ok = LifecycleAgent::new(false, false);
        ok.run(json!({})).await;
        assert_eq!(
            *ok.log.lock().unwrap(),
            vec!["initialize", "execute", "cleanup"]
        );
        assert_eq!(ok.state.status(), AgentStatus::Completed);

        let failing = LifecycleAgent::new(true, false);
        failing.run(json!({})).await;
        assert_eq!(
            *failing.log.lock().unwrap(),
            vec!["initialize", "execute", "cleanup"]
        );
        assert_eq!(failing.state.status(), AgentStatus::Failed);
    }

    #[tokio::test]
    async fn state_clears_execution_id_after_run() {
        let agent = LifecycleAgent::new(false, false);
        assert_eq!(agent.state.status(), AgentStatus::Idle);
        agent.run(json!({})).await;
        assert!(agent.state.current_execution().is_none());
    }

    #[tokio::test]
    async fn hooks_observe_success_and_error_transitions() {
        struct HookedAgent {
            spec: AgentSpec,
            hooks: AgentHooks,
            fail: bool,
        }

        #[async_trait]
        impl Agent for HookedAgent {
            fn name(&self) -> &str {
                &self.spec.name
            }

            fn spec(&self) -> AgentSpec {
                self.spec.clone()
            }

            fn hooks(&self) -> Option<&AgentHooks> {
                Some(&self.hooks)
            }

            async fn execute(&self, _params: Value) -> Result<Value, AgentError> {
                if self.fail {
                    Err(AgentError::Execution("scripted".to_string()))
                } else {
                    Ok(json!({}))
                }
            }
        }

        let successes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let afters = Arc::new(AtomicUsize::new(0));

        let make_agent = |fail: bool| {
            let successes = Arc::clone(&successes);
            let errors = Arc::clone(&errors);
            let afters = Arc::clone(&afters);
            HookedAgent {
                spec: AgentSpec::new("hooked")
                    .with_retry_count(1)
                    .with_retry_delay(Duration::ZERO),
                hooks: AgentHooks::builder()
                    .on_success(move |_| {
                        successes.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .on_error(move |_| {
                        errors.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .after_execute(move |_| {
                        afters.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .build(),
                fail,
            }
        };

        make_agent(false).run(json!({})).await;
        make_agent(true).run(json!({})).await;

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(afters.load(Ordering::SeqCst), 2);
    }
}
