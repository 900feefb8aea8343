use meshcore::{ExecutionContext, Node, NodeError, NodeResult};
use meshnodes::DatabaseNodeFactory;
use meshruntime::NodeFactory;
use serde_json::{json, Value};
use tempfile::TempDir;

fn db_node(config: Value) -> Box<dyn Node> {
    DatabaseNodeFactory
        .create("db", config.as_object().unwrap())
        .unwrap()
}

async fn run(config: Value, ctx: &ExecutionContext) -> NodeResult {
    db_node(config).execute(ctx).await.unwrap()
}

/// Temp database seeded with a small users table.
fn seeded_db() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.db").to_string_lossy().into_owned();
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL);
         INSERT INTO users (name, score) VALUES ('ada', 91.5);
         INSERT INTO users (name, score) VALUES ('bob', 40.0);
         INSERT INTO users (name, score) VALUES ('cyd', 77.0);",
    )
    .unwrap();
    (dir, path)
}

#[tokio::test]
async fn select_returns_rows_as_objects() {
    let (_dir, path) = seeded_db();
    let ctx = ExecutionContext::default();
    let result = run(
        json!({
            "connection": {"type": "sqlite", "path": path},
            "query": "SELECT name, score FROM users ORDER BY id",
        }),
        &ctx,
    )
    .await;

    assert!(result.is_success());
    assert_eq!(result.get("row_count"), Some(&json!(3)));
    assert_eq!(
        result.get("output"),
        Some(&json!([
            {"name": "ada", "score": 91.5},
            {"name": "bob", "score": 40.0},
            {"name": "cyd", "score": 77.0},
        ]))
    );
}

#[tokio::test]
async fn insert_reports_affected_rows() {
    let (_dir, path) = seeded_db();
    let ctx = ExecutionContext::default();
    let result = run(
        json!({
            "connection": {"path": path},
            "query": "INSERT INTO users (name, score) VALUES (?1, ?2)",
            "parameters": ["dee", 55.0],
            "output_mode": "affected",
        }),
        &ctx,
    )
    .await;

    assert!(result.is_success());
    assert_eq!(result.get("output"), Some(&json!(1)));
    assert_eq!(result.get("affected_rows"), Some(&json!(1)));
}

#[tokio::test]
async fn output_modes_shape_the_output() {
    let (_dir, path) = seeded_db();
    let ctx = ExecutionContext::default();
    let base = json!({"connection": {"path": path}});

    let mut config = base.clone();
    config["query"] = json!("SELECT name FROM users ORDER BY id");
    config["output_mode"] = json!("first");
    let result = run(config, &ctx).await;
    assert_eq!(result.get("output"), Some(&json!({"name": "ada"})));

    let mut config = base.clone();
    config["query"] = json!("SELECT COUNT(*) AS n FROM users");
    config["output_mode"] = json!("value");
    let result = run(config, &ctx).await;
    assert_eq!(result.get("output"), Some(&json!(3)));

    let mut config = base.clone();
    config["query"] = json!("SELECT id FROM users WHERE score > 50");
    config["output_mode"] = json!("count");
    let result = run(config, &ctx).await;
    assert_eq!(result.get("output"), Some(&json!(2)));

    let mut config = base.clone();
    config["query"] = json!("SELECT id FROM users WHERE score > 100");
    config["output_mode"] = json!("exists");
    let result = run(config, &ctx).await;
    assert_eq!(result.get("output"), Some(&json!(false)));
}

#[tokio::test]
async fn single_placeholder_parameter_binds_typed_value() {
    let (_dir, path) = seeded_db();
    let mut ctx = ExecutionContext::new(Value::Null);
    ctx.insert_result(
        "prev",
        json!({"output": {"min_score": 50}, "success": true}),
    );

    let result = run(
        json!({
            "connection": {"path": path},
            "query": "SELECT name FROM users WHERE score > ?1 ORDER BY id",
            "parameters": ["{{ prev.output.min_score }}"],
        }),
        &ctx,
    )
    .await;

    assert_eq!(
        result.get("output"),
        Some(&json!([{"name": "ada"}, {"name": "cyd"}]))
    );
}

#[tokio::test]
async fn placeholders_in_sql_text_are_rejected() {
    let ctx = ExecutionContext::new(json!({"name": "ada'; DROP TABLE users; --"}));
    let node = db_node(json!({
        "query": "SELECT * FROM users WHERE name = '{{ inputs.name }}'",
    }));
    let err = node.execute(&ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::UnsafeInterpolation(_)));
}

#[tokio::test]
async fn remote_backend_missing_credentials_fails_before_connecting() {
    let ctx = ExecutionContext::default();
    let node = db_node(json!({
        "connection": {"type": "postgresql", "host": "db.internal", "database": "app"},
        "query": "SELECT 1",
    }));
    let err = node.execute(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::MissingCredentials { ref backend, ref field }
            if backend == "postgresql" && field == "username"
    ));
}

#[tokio::test]
async fn allow_mock_returns_flagged_empty_result() {
    let ctx = ExecutionContext::default();
    let result = run(
        json!({
            "connection": {
                "type": "mysql",
                "host": "db.internal",
                "database": "app",
                "username": "svc",
                "password": "hunter2",
            },
            "query": "SELECT 1",
            "allow_mock": true,
        }),
        &ctx,
    )
    .await;

    assert!(result.is_success());
    assert_eq!(result.get("mock"), Some(&json!(true)));
    assert_eq!(result.get("output"), Some(&json!([])));
}

#[tokio::test]
async fn remote_backend_without_mock_is_unavailable() {
    let ctx = ExecutionContext::default();
    let node = db_node(json!({
        "connection": {"type": "mssql", "dsn": "mssql://svc:pw@db/app"},
        "query": "SELECT 1",
    }));
    let err = node.execute(&ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::BackendUnavailable(_)));
}

#[tokio::test]
async fn pathless_sqlite_runs_in_memory() {
    let ctx = ExecutionContext::default();
    let result = run(
        json!({"query": "SELECT 1 AS one", "output_mode": "value"}),
        &ctx,
    )
    .await;
    assert_eq!(result.get("output"), Some(&json!(1)));
}

#[tokio::test]
async fn sql_errors_are_captured_not_fatal() {
    let (_dir, path) = seeded_db();
    let ctx = ExecutionContext::default();
    let result = run(
        json!({
            "connection": {"path": path},
            "query": "SELECT * FROM no_such_table",
        }),
        &ctx,
    )
    .await;

    assert!(!result.is_success());
    assert!(result
        .get("error")
        .and_then(Value::as_str)
        .unwrap()
        .contains("no_such_table"));
}

#[tokio::test]
async fn readonly_connection_rejects_writes() {
    let (_dir, path) = seeded_db();
    let ctx = ExecutionContext::default();
    let result = run(
        json!({
            "connection": {"path": path},
            "query": "DELETE FROM users",
            "readonly": true,
        }),
        &ctx,
    )
    .await;
    assert!(!result.is_success());
}

#[tokio::test]
async fn fetch_size_caps_returned_rows() {
    let (_dir, path) = seeded_db();
    let ctx = ExecutionContext::default();
    let result = run(
        json!({
            "connection": {"path": path},
            "query": "SELECT id FROM users ORDER BY id",
            "fetch_size": 2,
        }),
        &ctx,
    )
    .await;
    assert_eq!(result.get("row_count"), Some(&json!(2)));
}

#[tokio::test]
async fn query_from_reads_sql_out_of_the_context() {
    let (_dir, path) = seeded_db();
    let mut ctx = ExecutionContext::new(Value::Null);
    ctx.insert_result(
        "planner",
        json!({"output": "SELECT name FROM users WHERE id = 1", "success": true}),
    );
    let result = run(
        json!({
            "connection": {"path": path},
            "query_from": "planner.output",
        }),
        &ctx,
    )
    .await;
    assert_eq!(result.get("output"), Some(&json!([{"name": "ada"}])));
}
