use crate::registry::NodeRegistry;
use chrono::Utc;
use meshcore::{
    EngineError, ErrorHandling, EventBus, ExecutionContext, ExecutionEvent, ExecutionId, Node,
    NodeError, NodeResult, NodeState, RunStatus, WorkflowDefinition, WorkflowError,
};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};

/// Executes workflow DAGs: owns the execution context, walks nodes in
/// dependency order with bounded sibling concurrency, merges each result
/// back into the context one completion at a time.
pub struct WorkflowExecutor {
    max_parallel: usize,
}

impl WorkflowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Execute a workflow against an initial input payload.
    ///
    /// Definition problems (duplicate ids, edges to undeclared ids, cycles,
    /// unknown node types, configs rejected by `validate`) are reported as
    /// errors before any node executes.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        registry: &NodeRegistry,
        event_bus: &EventBus,
        initial_input: Value,
    ) -> Result<ExecutionReport, EngineError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        let (graph, index) = self.build_graph(workflow)?;

        // Construct and validate every node before anything runs.
        let mut instances: HashMap<String, Box<dyn Node>> = HashMap::new();
        for spec in &workflow.nodes {
            let node = registry.create_node(&spec.node_type, &spec.id, &spec.config)?;
            if !node.validate() {
                return Err(WorkflowError::Invalid(format!(
                    "node '{}' ({}) failed configuration validation",
                    spec.id, spec.node_type
                ))
                .into());
            }
            instances.insert(spec.id.clone(), node);
        }

        event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            workflow_id: workflow.id,
            timestamp: Utc::now(),
        });
        tracing::info!(workflow = %workflow.name, %execution_id, "starting workflow execution");

        let mut ctx = ExecutionContext::new(initial_input);
        let mut states: HashMap<String, NodeState> = workflow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeState::Pending))
            .collect();

        let status = {
            let drive = self.drive(
                workflow,
                &graph,
                &index,
                instances,
                event_bus,
                execution_id,
                &mut ctx,
                &mut states,
            );
            match workflow.settings.run_timeout_ms {
                Some(ms) => match timeout(Duration::from_millis(ms), drive).await {
                    Ok(result) => result?,
                    Err(_) => RunStatus::Aborted,
                },
                None => drive.await?,
            }
        };

        if status == RunStatus::Aborted {
            // Deadline hit: dropping `drive` dropped its JoinSet, which
            // aborted every in-flight node task.
            for state in states.values_mut() {
                if *state == NodeState::Running {
                    *state = NodeState::Failed;
                }
            }
            tracing::warn!(%execution_id, "run deadline expired, aborting");
        }

        let output = designated_output(workflow, &ctx);
        let duration_ms = start_time.elapsed().as_millis() as u64;
        event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id,
            status,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(%execution_id, ?status, duration_ms, "workflow execution finished");

        Ok(ExecutionReport {
            execution_id,
            status,
            node_states: states,
            output,
            context: ctx.to_value(),
        })
    }

    /// Build the dependency graph and reject invalid definitions.
    fn build_graph(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<(DiGraph<String, ()>, HashMap<String, NodeIndex>), WorkflowError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for spec in &workflow.nodes {
            if index.contains_key(&spec.id) {
                return Err(WorkflowError::DuplicateNodeId(spec.id.clone()));
            }
            let idx = graph.add_node(spec.id.clone());
            index.insert(spec.id.clone(), idx);
        }

        for edge in &workflow.edges {
            let source = index
                .get(&edge.source)
                .ok_or_else(|| WorkflowError::NodeNotFound(edge.source.clone()))?;
            let target = index
                .get(&edge.target)
                .ok_or_else(|| WorkflowError::NodeNotFound(edge.target.clone()))?;
            graph.add_edge(*source, *target, ());
        }

        if toposort(&graph, None).is_err() {
            return Err(WorkflowError::CyclicDependency);
        }

        Ok((graph, index))
    }

    /// The scheduling loop. Merges are serialized here: one completion is
    /// folded into the context before the next is taken off the set.
    /// Dropping this future drops the JoinSet, aborting in-flight tasks.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        workflow: &WorkflowDefinition,
        graph: &DiGraph<String, ()>,
        index: &HashMap<String, NodeIndex>,
        mut instances: HashMap<String, Box<dyn Node>>,
        event_bus: &EventBus,
        execution_id: ExecutionId,
        ctx: &mut ExecutionContext,
        states: &mut HashMap<String, NodeState>,
    ) -> Result<RunStatus, EngineError> {
        let mut running: JoinSet<(String, Result<NodeResult, NodeError>, u64)> = JoinSet::new();
        let mut stopping = false;
        // The workflow may tighten the runtime-wide concurrency bound,
        // never widen it.
        let max_parallel = self
            .max_parallel
            .min(workflow.settings.max_parallel_nodes.max(1));

        loop {
            if !stopping {
                for node_id in find_ready_nodes(graph, index, states) {
                    if running.len() >= max_parallel {
                        break;
                    }
                    let node = match instances.remove(&node_id) {
                        Some(node) => node,
                        None => continue,
                    };
                    let node_type = node.node_type().to_string();
                    // Read-only snapshot for the duration of this execute call.
                    let snapshot = ctx.clone();
                    states.insert(node_id.clone(), NodeState::Running);
                    event_bus.emit(ExecutionEvent::NodeStarted {
                        execution_id,
                        node_id: node_id.clone(),
                        node_type,
                        timestamp: Utc::now(),
                    });

                    running.spawn(async move {
                        let start = Instant::now();
                        let result = node.execute(&snapshot).await;
                        (node_id, result, start.elapsed().as_millis() as u64)
                    });
                }
            }

            if running.is_empty() {
                break;
            }

            if let Some(joined) = running.join_next().await {
                let (node_id, exec_result, duration_ms) = joined
                    .map_err(|e| EngineError::Execution(format!("task join error: {}", e)))?;

                match exec_result {
                    Ok(result) => {
                        let success = result.is_success();
                        if success {
                            tracing::info!(node_id = %node_id, duration_ms, "node completed");
                        } else {
                            tracing::warn!(node_id = %node_id, "node captured a runtime failure");
                        }
                        event_bus.emit(ExecutionEvent::NodeCompleted {
                            execution_id,
                            node_id: node_id.clone(),
                            success,
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                        ctx.insert_result(&node_id, result.into_value());
                        states.insert(node_id, NodeState::Succeeded);
                    }
                    Err(e) => {
                        tracing::error!(node_id = %node_id, error = %e, "node raised a fatal error");
                        event_bus.emit(ExecutionEvent::NodeFailed {
                            execution_id,
                            node_id: node_id.clone(),
                            error: e.to_string(),
                            timestamp: Utc::now(),
                        });
                        // Merge an error-flagged stub so downstream
                        // references to this node resolve as absent.
                        ctx.insert_result(&node_id, NodeResult::failure(e.to_string()).into_value());
                        states.insert(node_id, NodeState::Failed);

                        if workflow.settings.on_error == ErrorHandling::StopWorkflow {
                            // Drain in-flight siblings, schedule nothing new.
                            stopping = true;
                        }
                    }
                }
            }
        }

        Ok(if stopping {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        })
    }
}

/// Pending nodes whose predecessors have all reached a terminal state.
/// A failed predecessor does not block its successors; references to its
/// output simply resolve as absent.
fn find_ready_nodes(
    graph: &DiGraph<String, ()>,
    index: &HashMap<String, NodeIndex>,
    states: &HashMap<String, NodeState>,
) -> Vec<String> {
    let mut ready = Vec::new();

    for (node_id, idx) in index {
        if states.get(node_id) != Some(&NodeState::Pending) {
            continue;
        }
        let dependencies_met = graph
            .neighbors_directed(*idx, Direction::Incoming)
            .all(|dep_idx| {
                let dep_id = &graph[dep_idx];
                states.get(dep_id).is_some_and(|s| s.is_terminal())
            });
        if dependencies_met {
            ready.push(node_id.clone());
        }
    }

    ready
}

/// Result of the last node typed "output", if the workflow designates one.
fn designated_output(workflow: &WorkflowDefinition, ctx: &ExecutionContext) -> Option<Value> {
    workflow
        .nodes
        .iter()
        .filter(|spec| spec.node_type == "output")
        .filter_map(|spec| ctx.get(&spec.id))
        .filter_map(|result| result.get("output"))
        .next_back()
        .cloned()
}

/// Result of workflow execution, serializable for the calling service.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution_id: ExecutionId,
    pub status: RunStatus,
    pub node_states: HashMap<String, NodeState>,
    /// The designated output node's `output`, when one exists.
    pub output: Option<Value>,
    /// The full final context, including `_initial_input`.
    pub context: Value,
}
