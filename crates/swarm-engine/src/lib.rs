//! Declarative multi-agent workflow execution.
//!
//! A [`Workflow`] is an ordered list of named [`WorkflowStep`]s, each naming
//! an agent (the `swarm-agent` contract), an input template and a dependency
//! set. The [`OrchestrationEngine`] runs it under one of three modes —
//! sequential, dependency-parallel or recursive-until-convergence — passing
//! data between steps through `${step.field}` templates and a shared
//! [`AgentMemory`], and always returning a [`WorkflowResult`].

pub mod engine;
pub mod memory;
pub mod template;
pub mod workflow;

pub use engine::{EngineConfig, OrchestrationEngine, OrchestrationError};
pub use memory::{AgentMemory, TraceEntry};
pub use template::resolve_template;
pub use workflow::{ExecutionMode, Workflow, WorkflowResult, WorkflowStatus, WorkflowStep};
