//! Typed lifecycle callback slots.
//!
//! An agent may carry one callback per transition: before execution starts,
//! after every run (success or failure), on success, and on error. Hook
//! failures are logged and swallowed; they never alter the run's outcome.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::AgentError;
use crate::result::AgentResult;

type ParamsHook = Arc<dyn Fn(&Value) -> Result<(), AgentError> + Send + Sync>;
type ResultHook = Arc<dyn Fn(&AgentResult) -> Result<(), AgentError> + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&AgentError) -> Result<(), AgentError> + Send + Sync>;

/// Registered lifecycle callbacks for one agent instance.
#[derive(Default, Clone)]
pub struct AgentHooks {
    before_execute: Option<ParamsHook>,
    after_execute: Option<ResultHook>,
    on_success: Option<ResultHook>,
    on_error: Option<ErrorHook>,
}

impl AgentHooks {
    pub fn builder() -> AgentHooksBuilder {
        AgentHooksBuilder::default()
    }

    pub(crate) fn fire_before_execute(&self, agent: &str, params: &Value) {
        if let Some(hook) = &self.before_execute {
            if let Err(error) = hook(params) {
                warn!(agent, %error, "before_execute hook failed; continuing");
            }
        }
    }

    pub(crate) fn fire_after_execute(&self, agent: &str, result: &AgentResult) {
        if let Some(hook) = &self.after_execute {
            if let Err(error) = hook(result) {
                warn!(agent, %error, "after_execute hook failed; continuing");
            }
        }
    }

    pub(crate) fn fire_on_success(&self, agent: &str, result: &AgentResult) {
        if let Some(hook) = &self.on_success {
            if let Err(error) = hook(result) {
                warn!(agent, %error, "on_success hook failed; continuing");
            }
        }
    }

    pub(crate) fn fire_on_error(&self, agent: &str, cause: &AgentError) {
        if let Some(hook) = &self.on_error {
            if let Err(error) = hook(cause) {
                warn!(agent, %error, "on_error hook failed; continuing");
            }
        }
    }
}

impl fmt::Debug for AgentHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHooks")
            .field("before_execute", &self.before_execute.is_some())
            .field("after_execute", &self.after_execute.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct AgentHooksBuilder {
    hooks: AgentHooks,
}

impl AgentHooksBuilder {
    #[must_use]
    pub fn before_execute(
        mut self,
        hook: impl Fn(&Value) -> Result<(), AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.before_execute = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn after_execute(
        mut self,
        hook: impl Fn(&AgentResult) -> Result<(), AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.after_execute = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_success(
        mut self,
        hook: impl Fn(&AgentResult) -> Result<(), AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_success = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_error(
        mut self,
        hook: impl Fn(&AgentError) -> Result<(), AgentError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> AgentHooks {
        self.hooks
    }
}
