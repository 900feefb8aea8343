use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type WorkflowId = Uuid;

/// Complete workflow definition: a DAG of typed nodes.
///
/// Immutable once a run starts. Node ids must be unique, edges may only
/// reference declared ids and the graph must be acyclic; the executor
/// rejects definitions that violate any of these before running a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<Edge>,
    pub settings: WorkflowSettings,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Declare a dependency edge: `target` runs after `source`.
    pub fn connect(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.edges.push(Edge {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Inert node configuration inside a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub node_type: String,
    pub name: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: None,
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Directed dependency between two declared node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Global workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    pub max_parallel_nodes: usize,
    /// Whole-run deadline; expiry aborts the run.
    pub run_timeout_ms: Option<u64>,
    pub on_error: ErrorHandling,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            run_timeout_ms: None,
            on_error: ErrorHandling::StopWorkflow,
        }
    }
}

/// Workflow-level policy for nodes whose `execute` raises a fatal error.
///
/// Runtime failures captured inside a node's own result never trigger this
/// policy; they are readable downstream like any other result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorHandling {
    /// Stop scheduling further nodes; the run ends `Failed`.
    StopWorkflow,
    /// Let independent branches keep running to a terminal state.
    ContinueOnError,
}
