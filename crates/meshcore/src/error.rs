use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors a node may surface from `execute`.
///
/// Ordinary runtime failures (bad responses, refused connections, SQL
/// errors) are *not* raised through this type; nodes fold those into an
/// error-flagged [`NodeResult`](crate::NodeResult). A `NodeError` means the
/// workflow definition or environment is broken and the run cannot proceed
/// safely.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing credentials for {backend} connection: {field}")]
    MissingCredentials { backend: String, field: String },

    #[error("Unsafe inline interpolation rejected: {0}")]
    UnsafeInterpolation(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
}
