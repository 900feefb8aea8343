//! Core abstractions for the workflow execution engine
//!
//! This crate provides the fundamental types every other component depends
//! on: the workflow model, the execution context, the node contract, the
//! value resolver and the error taxonomy. It performs no I/O of its own.

mod context;
mod error;
mod events;
mod node;
mod state;
pub mod template;
mod workflow;

pub use context::{ExecutionContext, NodeResult, INITIAL_INPUT_KEY};
pub use error::{EngineError, NodeError, WorkflowError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, ExecutionId, NodeEvent};
pub use node::Node;
pub use state::{NodeState, RunStatus};
pub use workflow::{
    Edge, ErrorHandling, NodeSpec, WorkflowDefinition, WorkflowId, WorkflowSettings,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
