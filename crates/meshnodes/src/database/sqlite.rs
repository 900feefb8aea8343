use super::QueryOutcome;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use meshcore::NodeError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};

pub(crate) struct SqliteOptions {
    pub readonly: bool,
    pub transaction: bool,
    pub fetch_size: Option<usize>,
}

/// Run one statement on the blocking pool; rusqlite connections must not
/// block the async executor.
pub(crate) async fn run_query(
    path: Option<String>,
    query: String,
    params: Vec<Value>,
    opts: SqliteOptions,
) -> Result<QueryOutcome, NodeError> {
    tokio::task::spawn_blocking(move || run_blocking(path.as_deref(), &query, &params, &opts))
        .await
        .map_err(|e| NodeError::ExecutionFailed(format!("sqlite task join error: {}", e)))?
}

fn run_blocking(
    path: Option<&str>,
    query: &str,
    params: &[Value],
    opts: &SqliteOptions,
) -> Result<QueryOutcome, NodeError> {
    let mut conn = open(path, opts.readonly)?;
    let is_select = query.trim_start().to_uppercase().starts_with("SELECT");

    if is_select {
        let mut stmt = conn.prepare(query).map_err(sql_err)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut out = Vec::new();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(bind_value)))
            .map_err(sql_err)?;
        while let Some(row) = rows.next().map_err(sql_err)? {
            if opts.fetch_size.is_some_and(|limit| out.len() >= limit) {
                break;
            }
            let mut object = Map::new();
            for (i, column) in columns.iter().enumerate() {
                object.insert(column.clone(), column_value(row, i));
            }
            out.push(Value::Object(object));
        }
        Ok(QueryOutcome {
            row_count: out.len(),
            columns,
            rows: out,
            affected_rows: 0,
            mock: false,
        })
    } else {
        let params = rusqlite::params_from_iter(params.iter().map(bind_value));
        let affected = if opts.transaction {
            let tx = conn.transaction().map_err(sql_err)?;
            let affected = tx.execute(query, params).map_err(sql_err)?;
            tx.commit().map_err(sql_err)?;
            affected
        } else {
            conn.execute(query, params).map_err(sql_err)?
        };
        Ok(QueryOutcome {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            affected_rows: affected,
            mock: false,
        })
    }
}

fn open(path: Option<&str>, readonly: bool) -> Result<Connection, NodeError> {
    let conn = match path {
        None => Connection::open_in_memory(),
        Some(path) if readonly => Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ),
        Some(path) => Connection::open(path),
    };
    conn.map_err(|e| NodeError::ExecutionFailed(format!("failed to open sqlite database: {}", e)))
}

fn sql_err(e: rusqlite::Error) -> NodeError {
    NodeError::ExecutionFailed(format!("sqlite error: {}", e))
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Sql::Real(f)
            } else {
                Sql::Null
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        // Arrays and objects bind as their JSON text.
        other => Sql::Text(other.to_string()),
    }
}

fn column_value(row: &rusqlite::Row<'_>, index: usize) -> Value {
    match row.get_ref(index) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => i.into(),
        Ok(ValueRef::Real(f)) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Ok(ValueRef::Text(t)) => Value::String(String::from_utf8_lossy(t).into_owned()),
        Ok(ValueRef::Blob(b)) => Value::String(STANDARD.encode(b)),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bind_preserves_scalar_types() {
        use rusqlite::types::Value as Sql;
        assert_eq!(bind_value(&json!(5)), Sql::Integer(5));
        assert_eq!(bind_value(&json!(2.5)), Sql::Real(2.5));
        assert_eq!(bind_value(&json!(true)), Sql::Integer(1));
        assert_eq!(bind_value(&json!("x")), Sql::Text("x".to_string()));
        assert_eq!(bind_value(&Value::Null), Sql::Null);
        assert_eq!(bind_value(&json!([1, 2])), Sql::Text("[1,2]".to_string()));
    }
}
