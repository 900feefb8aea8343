use async_trait::async_trait;
use meshcore::{template, ExecutionContext, Node, NodeError, NodeResult};
use meshruntime::{NodeFactory, NodeTypeInfo};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Filter node: selects items from a sequence in the context.
///
/// Each condition reads a dotted field out of the item; a missing field
/// makes the condition false, never an error.
pub struct FilterNode {
    id: String,
    config: FilterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Context path resolving to the sequence to filter.
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    In,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[async_trait]
impl Node for FilterNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "filter"
    }

    fn validate(&self) -> bool {
        !self.config.input.trim().is_empty()
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let items = match template::resolve_path(&self.config.input, ctx) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Ok(NodeResult::failure(format!(
                    "input '{}' did not resolve to a sequence",
                    self.config.input
                )))
            }
            None => {
                return Ok(NodeResult::failure(format!(
                    "input '{}' resolved to no value",
                    self.config.input
                )))
            }
        };

        let total = items.len();
        let mut kept = Vec::new();
        for item in items {
            if self.matches(&item, ctx) {
                kept.push(item);
                if self.config.limit.is_some_and(|limit| kept.len() >= limit) {
                    break;
                }
            }
        }

        tracing::debug!(node_id = %self.id, total, kept = kept.len(), "filter applied");
        let count = kept.len();
        Ok(NodeResult::success(Value::Array(kept))
            .with("count", count)
            .with("total", total))
    }
}

impl FilterNode {
    fn matches(&self, item: &Value, ctx: &ExecutionContext) -> bool {
        if self.config.conditions.is_empty() {
            return true;
        }
        let mut verdicts = self.config.conditions.iter().map(|condition| {
            let actual = if condition.field.is_empty() {
                Some(item)
            } else {
                let segments: Vec<&str> = condition.field.split('.').collect();
                template::lookup_segments(item, &segments)
            };
            let expected = template::render_value(&condition.value, ctx);
            ConditionEvaluator::evaluate(actual, condition.operator, &expected)
        });
        match self.config.logical_operator {
            LogicalOperator::And => verdicts.all(|v| v),
            LogicalOperator::Or => verdicts.any(|v| v),
        }
    }
}

/// Stateless comparison semantics shared by filter-style nodes.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn evaluate(actual: Option<&Value>, operator: ComparisonOperator, expected: &Value) -> bool {
        if operator == ComparisonOperator::Exists {
            return actual.is_some_and(|v| !v.is_null());
        }
        let Some(actual) = actual else {
            return false;
        };
        match operator {
            ComparisonOperator::Equals => loose_eq(actual, expected),
            ComparisonOperator::NotEquals => !loose_eq(actual, expected),
            ComparisonOperator::GreaterThan => numeric(actual, expected, |a, b| a > b),
            ComparisonOperator::GreaterThanOrEqual => numeric(actual, expected, |a, b| a >= b),
            ComparisonOperator::LessThan => numeric(actual, expected, |a, b| a < b),
            ComparisonOperator::LessThanOrEqual => numeric(actual, expected, |a, b| a <= b),
            ComparisonOperator::Contains => match actual {
                Value::String(s) => expected.as_str().is_some_and(|needle| s.contains(needle)),
                Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
                _ => false,
            },
            ComparisonOperator::StartsWith => match (actual.as_str(), expected.as_str()) {
                (Some(s), Some(prefix)) => s.starts_with(prefix),
                _ => false,
            },
            ComparisonOperator::In => expected
                .as_array()
                .is_some_and(|set| set.iter().any(|member| loose_eq(actual, member))),
            ComparisonOperator::Exists => unreachable!(),
        }
    }
}

/// Equality that treats 5 and 5.0 as the same value.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        return x.as_f64() == y.as_f64();
    }
    a == b
}

fn numeric(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

pub struct FilterNodeFactory;

impl NodeFactory for FilterNodeFactory {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        let config: FilterConfig = serde_json::from_value(Value::Object(config.clone()))
            .map_err(|e| NodeError::Configuration(format!("invalid filter config: {}", e)))?;
        Ok(Box::new(FilterNode {
            id: node_id.to_string(),
            config,
        }))
    }

    fn node_type(&self) -> &str {
        "filter"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Filter a sequence by field conditions".to_string(),
            category: "data".to_string(),
        }
    }
}
