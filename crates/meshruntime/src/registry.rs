use meshcore::{Node, NodeError, WorkflowError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances.
///
/// A factory carries the protocol-specific behavior of one node type; the
/// node identity (id, config) is bound to it only here, at construction
/// time. New node kinds are added by registering another factory; the
/// registry itself never changes.
pub trait NodeFactory: Send + Sync {
    /// Build a node bound to `node_id` with the given configuration.
    fn create(&self, node_id: &str, config: &Map<String, Value>)
        -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Optional: Get node metadata (description, category)
    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeTypeInfo {
    pub description: String,
    pub category: String,
}

impl Default for NodeTypeInfo {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available node types
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Create a node instance from a type tag, node id and config.
    pub fn create_node(
        &self,
        node_type: &str,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Box<dyn Node>, WorkflowError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;

        factory.create(node_id, config).map_err(|e| {
            WorkflowError::Invalid(format!("failed to create node '{}': {}", node_id, e))
        })
    }

    /// Get all registered node types
    pub fn list_node_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeTypeInfo> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
