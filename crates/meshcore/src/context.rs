use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved context key holding the caller-supplied payload for the run.
pub const INITIAL_INPUT_KEY: &str = "_initial_input";

/// Accumulated state of one workflow run.
///
/// Every top-level key other than [`INITIAL_INPUT_KEY`] is a node id mapped
/// to that node's result. The executor is the only writer; nodes receive a
/// read-only snapshot for the duration of their `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    values: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(initial_input: Value) -> Self {
        let mut values = Map::new();
        values.insert(INITIAL_INPUT_KEY.to_string(), initial_input);
        Self { values }
    }

    pub fn initial_input(&self) -> &Value {
        self.values.get(INITIAL_INPUT_KEY).unwrap_or(&Value::Null)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge a node's result under its own id.
    ///
    /// The initial input is never overwritten, whatever a node is named.
    pub fn insert_result(&mut self, node_id: &str, result: Value) {
        if node_id == INITIAL_INPUT_KEY {
            tracing::warn!("refusing to overwrite reserved context key {INITIAL_INPUT_KEY}");
            return;
        }
        self.values.insert(node_id.to_string(), result);
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

/// Keyed value bag produced by one node execution.
///
/// By convention carries an `output` field (what other nodes reference by
/// default) and a `success` flag, plus whatever diagnostics the node type
/// adds (status code, row count, error message, ...).
#[derive(Debug, Clone, Default)]
pub struct NodeResult {
    fields: Map<String, Value>,
}

impl NodeResult {
    pub fn success(output: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert("output".to_string(), output.into());
        fields.insert("success".to_string(), Value::Bool(true));
        Self { fields }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("output".to_string(), Value::Null);
        fields.insert("success".to_string(), Value::Bool(false));
        fields.insert("error".to_string(), Value::String(error.into()));
        Self { fields }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.fields
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_input_is_never_overwritten() {
        let mut ctx = ExecutionContext::new(json!({"q": 1}));
        ctx.insert_result(INITIAL_INPUT_KEY, json!("clobbered"));
        assert_eq!(ctx.initial_input(), &json!({"q": 1}));
    }

    #[test]
    fn results_keyed_by_node_id() {
        let mut ctx = ExecutionContext::new(Value::Null);
        ctx.insert_result("fetch", NodeResult::success(json!([1, 2])).into_value());
        let result = ctx.get("fetch").unwrap();
        assert_eq!(result["output"], json!([1, 2]));
        assert_eq!(result["success"], json!(true));
    }

    #[test]
    fn failure_result_shape() {
        let result = NodeResult::failure("connection refused")
            .with("status_code", 503)
            .into_value();
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["output"], Value::Null);
        assert_eq!(result["error"], json!("connection refused"));
        assert_eq!(result["status_code"], json!(503));
    }
}
