//! Standard node library
//!
//! Each node type ships as a [`meshruntime::NodeFactory`] so a registry can
//! compose instances from workflow definitions. [`register_all`] wires the
//! whole set into a registry in one call.

mod database;
mod filter;
mod http;
mod io;
mod llm;

pub use database::{ConnectionConfig, DatabaseConfig, DatabaseNode, DatabaseNodeFactory, OutputMode};
pub use filter::{
    ComparisonOperator, Condition, ConditionEvaluator, FilterConfig, FilterNode,
    FilterNodeFactory, LogicalOperator,
};
pub use http::{AuthConfig, HttpConfig, HttpNode, HttpNodeFactory, ResponseFormat};
pub use io::{InputNode, InputNodeFactory, OutputNode, OutputNodeFactory};
pub use llm::{LlmConfig, LlmNode, LlmNodeFactory};

use meshruntime::NodeRegistry;
use std::sync::Arc;

/// Register every built-in node type.
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(InputNodeFactory));
    registry.register(Arc::new(OutputNodeFactory));
    registry.register(Arc::new(LlmNodeFactory));
    registry.register(Arc::new(HttpNodeFactory));
    registry.register(Arc::new(DatabaseNodeFactory));
    registry.register(Arc::new(FilterNodeFactory));
}
