//! Workflow execution runtime
//!
//! This crate provides the execution engine that runs workflow DAGs, the
//! node registry that composes node instances from type tags, and the
//! runtime facade that ties both to an event bus.

mod executor;
mod registry;
mod runtime;

pub use executor::{ExecutionReport, WorkflowExecutor};
pub use registry::{NodeFactory, NodeRegistry, NodeTypeInfo};
pub use runtime::{RuntimeConfig, WorkflowRuntime};
