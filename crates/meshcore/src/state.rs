use serde::{Deserialize, Serialize};

/// Per-node lifecycle within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    /// `execute` returned a result, possibly an error-flagged one.
    Succeeded,
    /// `execute` raised a configuration/fatal error.
    Failed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Failed)
    }
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node reached a terminal state.
    Completed,
    /// A fatal node error stopped the run under `StopWorkflow`.
    Failed,
    /// The run deadline expired before all nodes finished.
    Aborted,
}
