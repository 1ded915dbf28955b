//! Agent contract and bounded-concurrency dispatch.
//!
//! The pieces here are deliberately small:
//! - [`Agent`]: the uniform async unit-of-work contract, with a provided
//!   [`Agent::run`] lifecycle driver (validation, retry-with-timeout, hooks,
//!   guaranteed cleanup).
//! - [`AgentRegistry`]: explicit name-to-instance lookup with category and
//!   tag indexes.
//! - [`AgentExecutor`]: parallel / sequential / dependency-ordered dispatch
//!   of fixed agent collections under a shared semaphore.
//!
//! Declarative workflow execution on top of this contract lives in the
//! `swarm-engine` crate.

pub mod agent;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod registry;
pub mod result;

pub use agent::{Agent, AgentSpec, AgentState, SharedAgent};
pub use error::AgentError;
pub use executor::{
    AgentExecutor, BatchResult, BatchStatus, DispatchMode, ExecutionPlan, ExecutorError,
};
pub use hooks::{AgentHooks, AgentHooksBuilder};
pub use registry::{AgentRegistry, RegistryError};
pub use result::{AgentResult, AgentStatus};
