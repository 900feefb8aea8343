mod remote;
mod sqlite;

use async_trait::async_trait;
use meshcore::{template, ExecutionContext, Node, NodeError, NodeResult};
use meshruntime::{NodeFactory, NodeTypeInfo};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Database query node.
///
/// SQLite runs in-process; other backends fail fast on missing credentials
/// and then either report themselves unavailable or, when `allow_mock` is
/// set, return an empty result flagged `mock`. Placeholders are never
/// spliced into the SQL text; all dynamic values go through bound
/// parameters.
pub struct DatabaseNode {
    id: String,
    config: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    pub query: Option<String>,
    /// Context path to take the SQL text from instead of `query`.
    pub query_from: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Value>,
    /// Context path resolving to a parameter sequence.
    pub parameters_from: Option<String>,
    #[serde(default)]
    pub output_mode: OutputMode,
    pub fetch_size: Option<usize>,
    #[serde(default)]
    pub transaction: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub allow_mock: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// SQLite file path; absent means an in-memory database.
    pub path: Option<String>,
    pub dsn: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Rows,
    First,
    Value,
    Count,
    Affected,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backend {
    Sqlite,
    Postgresql,
    Mysql,
    Mssql,
}

impl Backend {
    fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Backend::Postgresql,
            "mysql" => Backend::Mysql,
            "mssql" | "sqlserver" => Backend::Mssql,
            "sqlite" | "" => Backend::Sqlite,
            other => {
                tracing::debug!(backend = other, "unknown connection type, treating as sqlite");
                Backend::Sqlite
            }
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgresql => "postgresql",
            Backend::Mysql => "mysql",
            Backend::Mssql => "mssql",
        }
    }
}

/// Raw result of one query, before output shaping.
#[derive(Debug)]
pub(crate) struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub affected_rows: usize,
    pub mock: bool,
}

#[async_trait]
impl Node for DatabaseNode {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "database"
    }

    fn validate(&self) -> bool {
        self.config.query.is_some() || self.config.query_from.is_some()
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let query = self.query_text(ctx)?;
        if template::contains_placeholder(&query) {
            return Err(NodeError::UnsafeInterpolation(
                "SQL text contains {{ }} placeholders; use bound parameters instead".to_string(),
            ));
        }
        let params = self.resolve_parameters(ctx)?;

        let backend = Backend::from_tag(&self.config.connection.kind);
        let outcome = match backend {
            Backend::Sqlite => {
                sqlite::run_query(
                    self.config.connection.path.clone(),
                    query,
                    params,
                    sqlite::SqliteOptions {
                        readonly: self.config.readonly,
                        transaction: self.config.transaction,
                        fetch_size: self.config.fetch_size,
                    },
                )
                .await
            }
            other => remote::run_query(&self.config.connection, other, self.config.allow_mock),
        };

        match outcome {
            Ok(outcome) => Ok(self.shape_result(outcome)),
            // Driver-level failures are run outcomes, not engine faults.
            Err(NodeError::ExecutionFailed(message)) => {
                tracing::warn!(node_id = %self.id, error = %message, "query failed");
                Ok(NodeResult::failure(message)
                    .with("row_count", 0)
                    .with("affected_rows", 0))
            }
            Err(e) => Err(e),
        }
    }
}

impl DatabaseNode {
    fn query_text(&self, ctx: &ExecutionContext) -> Result<String, NodeError> {
        if let Some(query) = &self.config.query {
            return Ok(query.clone());
        }
        if let Some(path) = &self.config.query_from {
            return match template::resolve_path(path, ctx) {
                Some(Value::String(query)) => Ok(query),
                Some(_) => Err(NodeError::Configuration(format!(
                    "query_from '{}' did not resolve to text",
                    path
                ))),
                None => Err(NodeError::Configuration(format!(
                    "query_from '{}' resolved to no value",
                    path
                ))),
            };
        }
        Err(NodeError::Configuration(
            "database node requires 'query' or 'query_from'".to_string(),
        ))
    }

    fn resolve_parameters(&self, ctx: &ExecutionContext) -> Result<Vec<Value>, NodeError> {
        let raw = if let Some(path) = &self.config.parameters_from {
            match template::resolve_path(path, ctx) {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(NodeError::Configuration(format!(
                        "parameters_from '{}' did not resolve to a sequence",
                        path
                    )))
                }
                None => {
                    return Err(NodeError::Configuration(format!(
                        "parameters_from '{}' resolved to no value",
                        path
                    )))
                }
            }
        } else {
            self.config.parameters.clone()
        };
        Ok(raw.into_iter().map(|p| resolve_parameter(p, ctx)).collect())
    }

    fn shape_result(&self, outcome: QueryOutcome) -> NodeResult {
        let output = match self.config.output_mode {
            OutputMode::Rows => Value::Array(outcome.rows.clone()),
            OutputMode::First => outcome.rows.first().cloned().unwrap_or(Value::Null),
            OutputMode::Value => outcome
                .rows
                .first()
                .and_then(|row| outcome.columns.first().and_then(|col| row.get(col)))
                .cloned()
                .unwrap_or(Value::Null),
            OutputMode::Count => outcome.row_count.into(),
            OutputMode::Affected => outcome.affected_rows.into(),
            OutputMode::Exists => (outcome.row_count > 0).into(),
        };
        let mut result = NodeResult::success(output)
            .with("row_count", outcome.row_count)
            .with("affected_rows", outcome.affected_rows);
        if outcome.mock {
            result = result.with("mock", true);
        }
        result
    }
}

/// A string parameter that is exactly one placeholder binds the resolved
/// value with its type intact; mixed text renders to a string; everything
/// else binds literally.
fn resolve_parameter(param: Value, ctx: &ExecutionContext) -> Value {
    match param {
        Value::String(s) => {
            if let Some(path) = template::single_placeholder(&s) {
                template::resolve_path(&path, ctx).unwrap_or(Value::Null)
            } else if template::contains_placeholder(&s) {
                Value::String(template::render_template(&s, ctx))
            } else {
                Value::String(s)
            }
        }
        other => other,
    }
}

pub struct DatabaseNodeFactory;

impl NodeFactory for DatabaseNodeFactory {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Box<dyn Node>, NodeError> {
        let config: DatabaseConfig = serde_json::from_value(Value::Object(config.clone()))
            .map_err(|e| NodeError::Configuration(format!("invalid database config: {}", e)))?;
        Ok(Box::new(DatabaseNode {
            id: node_id.to_string(),
            config,
        }))
    }

    fn node_type(&self) -> &str {
        "database"
    }

    fn metadata(&self) -> NodeTypeInfo {
        NodeTypeInfo {
            description: "Run SQL queries with bound parameters".to_string(),
            category: "data".to_string(),
        }
    }
}
