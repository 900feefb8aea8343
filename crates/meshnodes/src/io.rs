use async_trait::async_trait;
use meshcore::{template, ExecutionContext, Node, NodeError, NodeResult};
use meshruntime::{NodeFactory, NodeTypeInfo};
use serde_json::{Map, Value};

/// Entry node: surfaces the run's initial input (or one dotted key of it)
/// as its output so downstream nodes can reference it by node id.
pub struct InputNode {
    id: String,
    key: Option<String>,
}

#[async_trait]
impl Node for InputNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "input"
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let initial = ctx.initial_input();
        let output = match &self.key {
            Some(key) => {
                let segments: Vec<&str> = key.split('.').collect();
                template::lookup_segments(initial, &segments)
                    .cloned()
                    .unwrap_or(Value::Null)
            }
            None => initial.clone(),
        };
        Ok(NodeResult::success(output))
    }
}

pub struct InputNodeFactory;

impl NodeFactory for InputNodeFactory {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(InputNode {
            id: node_id.to_string(),
            key: config.get("key").and_then(Value::as_str).map(String::from),
        }))
    }

    fn node_type(&self) -> &str {
        "input"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Expose the run's initial input".to_string(),
            category: "io".to_string(),
        }
    }
}

/// Exit node: renders a templated `value` or resolves a `source` path.
/// The executor surfaces the last output node's result on the report.
pub struct OutputNode {
    id: String,
    value: Option<Value>,
    source: Option<String>,
}

#[async_trait]
impl Node for OutputNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "output"
    }

    fn validate(&self) -> bool {
        self.value.is_some() || self.source.is_some()
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let output = if let Some(value) = &self.value {
            template::render_value(value, ctx)
        } else if let Some(source) = &self.source {
            template::resolve_path(source, ctx).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        Ok(NodeResult::success(output))
    }
}

pub struct OutputNodeFactory;

impl NodeFactory for OutputNodeFactory {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(OutputNode {
            id: node_id.to_string(),
            value: config.get("value").cloned(),
            source: config
                .get("source")
                .and_then(Value::as_str)
                .map(String::from),
        }))
    }

    fn node_type(&self) -> &str {
        "output"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Shape the workflow's final output".to_string(),
            category: "io".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn input_node_passes_initial_input_through() {
        let ctx = ExecutionContext::new(json!({"user": {"name": "ada"}}));
        let node = InputNodeFactory
            .create("seed", json!({}).as_object().unwrap())
            .unwrap();
        let result = node.execute(&ctx).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.get("output"), Some(&json!({"user": {"name": "ada"}})));
    }

    #[tokio::test]
    async fn input_node_key_selects_a_branch() {
        let ctx = ExecutionContext::new(json!({"user": {"name": "ada"}}));
        let node = InputNodeFactory
            .create("seed", json!({"key": "user.name"}).as_object().unwrap())
            .unwrap();
        let result = node.execute(&ctx).await.unwrap();
        assert_eq!(result.get("output"), Some(&json!("ada")));

        let node = InputNodeFactory
            .create("seed", json!({"key": "user.age"}).as_object().unwrap())
            .unwrap();
        let result = node.execute(&ctx).await.unwrap();
        assert_eq!(result.get("output"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn output_node_renders_value_template() {
        let mut ctx = ExecutionContext::new(Value::Null);
        ctx.insert_result("work", json!({"output": 9, "success": true}));
        let node = OutputNodeFactory
            .create(
                "final",
                json!({"value": {"answer": "{{ work.output }}"}})
                    .as_object()
                    .unwrap(),
            )
            .unwrap();
        let result = node.execute(&ctx).await.unwrap();
        assert_eq!(result.get("output"), Some(&json!({"answer": "9"})));
    }

    #[tokio::test]
    async fn output_node_source_keeps_value_type() {
        let mut ctx = ExecutionContext::new(Value::Null);
        ctx.insert_result("work", json!({"output": [1, 2], "success": true}));
        let node = OutputNodeFactory
            .create("final", json!({"source": "work.output"}).as_object().unwrap())
            .unwrap();
        let result = node.execute(&ctx).await.unwrap();
        assert_eq!(result.get("output"), Some(&json!([1, 2])));
    }

    #[test]
    fn output_node_needs_value_or_source() {
        let node = OutputNodeFactory
            .create("final", json!({}).as_object().unwrap())
            .unwrap();
        assert!(!node.validate());
    }
}
