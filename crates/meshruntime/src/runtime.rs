use crate::{registry::NodeRegistry, ExecutionReport, WorkflowExecutor};
use meshcore::{EngineError, EventBus, WorkflowDefinition, WorkflowError, WorkflowId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Main runtime for executing workflows.
///
/// Constructed once at process start and passed by reference; there are no
/// process-wide singletons.
pub struct WorkflowRuntime {
    registry: Arc<NodeRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    workflows: Arc<RwLock<HashMap<WorkflowId, WorkflowDefinition>>>,
}

impl WorkflowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(NodeRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(config.max_parallel_nodes));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor,
            event_bus,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get access to the node registry for registering node types
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Register a workflow definition for execution by id.
    pub async fn register_workflow(&self, workflow: WorkflowDefinition) {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id, workflow);
    }

    /// Execute a registered workflow by id.
    pub async fn execute_workflow(
        &self,
        workflow_id: WorkflowId,
        initial_input: Value,
    ) -> Result<ExecutionReport, EngineError> {
        let workflows = self.workflows.read().await;
        let workflow = workflows
            .get(&workflow_id)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;

        self.executor
            .execute(workflow, &self.registry, &self.event_bus, initial_input)
            .await
    }

    /// Execute a workflow directly (without registration)
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        initial_input: Value,
    ) -> Result<ExecutionReport, EngineError> {
        self.executor
            .execute(workflow, &self.registry, &self.event_bus, initial_input)
            .await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<meshcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for WorkflowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
        }
    }
}
