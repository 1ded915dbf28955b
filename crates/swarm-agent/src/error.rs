//! Error taxonomy for single-agent execution.

use thiserror::Error;

/// Failure kinds a single agent invocation can surface.
///
/// All of these are converted into a failed [`crate::AgentResult`] by
/// [`crate::Agent::run`]; callers of `run()` never see a raised error.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("attempt exceeded timeout of {0:.1}s")]
    Timeout(f64),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("execution cancelled")]
    Cancelled,
}

impl AgentError {
    /// True for errors the retry loop is allowed to retry.
    ///
    /// Validation and initialization failures are detected before the
    /// attempt loop starts and are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Timeout(_) | AgentError::Execution(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
