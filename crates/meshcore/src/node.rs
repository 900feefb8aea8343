use crate::{ExecutionContext, NodeError, NodeResult};
use async_trait::async_trait;

/// Core trait that all executable nodes implement.
///
/// A node instance is constructed fresh for each run from its spec and is
/// stateless across runs; any retry counters live inside a single
/// `execute` call.
#[async_trait]
pub trait Node: Send + Sync {
    /// The node id this instance is bound to within its workflow.
    fn node_id(&self) -> &str;

    /// Type tag (e.g. "http", "database", "filter").
    fn node_type(&self) -> &str;

    /// Cheap, synchronous configuration check. No I/O, never panics.
    fn validate(&self) -> bool {
        true
    }

    /// Run the node against a read-only snapshot of the context.
    ///
    /// Ordinary runtime failures are captured into the returned result
    /// (`success=false`, `error`); `Err` is reserved for configuration or
    /// fatal conditions that mean the workflow cannot proceed safely.
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeResult, NodeError>;
}
