//! The execution orchestrator: state machine and graph walk.
//!
//! Lifecycle: Pending -> Running -> Success | Failed, with a durable
//! Waiting suspension produced by wait nodes. Every run loads its graph
//! fresh from storage, validates it (cycles fail the run before any node
//! executes), then walks nodes in topological order. A branch decision
//! switches the walk to adjacency-driven traversal: only nodes reachable
//! from the taken output still execute, the rest are checkpointed Skipped.
//!
//! Each node is a durable step: start and outcome are checkpointed around
//! the executor call, transient failures retry up to `MAX_NODE_ATTEMPTS`,
//! and any non-retriable failure marks the whole execution Failed.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use flowline_types::event::EngineEvent;
use flowline_types::workflow::{ExecutionRecord, ExecutionStatus, WorkflowGraph};
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::condition::CategoryLookup;
use super::context::{ExecutionContext, WAIT_KEY};
use super::dispatcher::TriggerSink;
use super::effects::SideEffects;
use super::graph::{build_adjacency, next_node_ids, reachable_from, topo_sort};
use super::registry::{ExecutorEnv, ExecutorRegistry};
use crate::event::EventBus;
use crate::repository::workflow::WorkflowRepository;

/// Maximum attempts per node (first execution included).
pub const MAX_NODE_ATTEMPTS: u32 = 3;

/// Wall-clock budget per node attempt.
pub const NODE_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from orchestrator entry points.
///
/// Node failures do not surface here: they land on the execution record's
/// status and error message. These errors are for callers that could not
/// even get a run going.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("execution {0} is not waiting")]
    NotWaiting(Uuid),

    #[error("repository error: {0}")]
    Repository(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

// ---------------------------------------------------------------------------
// Launcher port
// ---------------------------------------------------------------------------

/// Fire-and-forget launch interface used by the dispatcher, coalescer, and
/// checkers. Implementations log failures instead of returning them.
pub trait ExecutionLauncher: Send + Sync {
    fn launch(&self, workflow_id: Uuid, initial_context: Value) -> BoxFuture<'_, ()>;
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives workflow executions against a repository, an executor registry,
/// and the side-effect capabilities.
pub struct Orchestrator<R: WorkflowRepository> {
    checkpoint: Arc<CheckpointManager<R>>,
    registry: Arc<ExecutorRegistry>,
    bus: EventBus,
    effects: Arc<dyn SideEffects>,
    categories: Arc<dyn CategoryLookup>,
    // Set after construction to break the orchestrator <-> dispatcher cycle.
    trigger_sink: OnceLock<Arc<dyn TriggerSink>>,
}

impl<R: WorkflowRepository> Orchestrator<R> {
    pub fn new(
        checkpoint: Arc<CheckpointManager<R>>,
        registry: Arc<ExecutorRegistry>,
        bus: EventBus,
        effects: Arc<dyn SideEffects>,
        categories: Arc<dyn CategoryLookup>,
    ) -> Self {
        Self {
            checkpoint,
            registry,
            bus,
            effects,
            categories,
            trigger_sink: OnceLock::new(),
        }
    }

    /// Wire the trigger sink so executors can chain workflow-to-workflow
    /// firings. Later calls are ignored.
    pub fn set_trigger_sink(&self, sink: Arc<dyn TriggerSink>) {
        let _ = self.trigger_sink.set(sink);
    }

    /// Access the checkpoint manager (and through it, the repository).
    pub fn checkpoint(&self) -> &CheckpointManager<R> {
        &self.checkpoint
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Execute a workflow from scratch.
    ///
    /// Returns the final record: Success, Failed, or Waiting when a wait
    /// node suspended the run.
    pub async fn run(
        &self,
        workflow_id: Uuid,
        initial_context: ExecutionContext,
    ) -> Result<ExecutionRecord, OrchestratorError> {
        let graph = self
            .checkpoint
            .repo()
            .get_graph(&workflow_id)
            .await
            .map_err(|e| OrchestratorError::Repository(e.to_string()))?
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))?;

        let mut record =
            ExecutionRecord::new(workflow_id, &graph.name, initial_context.to_value());
        self.checkpoint
            .repo()
            .create_execution(&record)
            .await
            .map_err(|e| OrchestratorError::Repository(e.to_string()))?;

        if let Err(e) = self.registry.validate_graph(&graph) {
            return Ok(self.fail(record, &e.to_string(), &initial_context).await?);
        }

        record.status = ExecutionStatus::Running;
        self.checkpoint
            .execution_status(record.id, ExecutionStatus::Running, None, None)
            .await?;
        self.bus.publish(EngineEvent::ExecutionStarted {
            execution_id: record.id,
            workflow_id,
            workflow_name: graph.name.clone(),
        });
        tracing::info!(execution_id = %record.id, %workflow_id, "execution started");

        self.walk(graph, record, initial_context, HashSet::new()).await
    }

    /// Resume a Waiting execution from its persisted snapshot.
    ///
    /// Completed and skipped nodes are not re-executed; the walk picks up
    /// after the wait node that suspended the run.
    pub async fn resume(&self, execution_id: Uuid) -> Result<ExecutionRecord, OrchestratorError> {
        let record = self
            .checkpoint
            .repo()
            .get_execution(&execution_id)
            .await
            .map_err(|e| OrchestratorError::Repository(e.to_string()))?
            .ok_or(OrchestratorError::ExecutionNotFound(execution_id))?;

        if record.status != ExecutionStatus::Waiting {
            return Err(OrchestratorError::NotWaiting(execution_id));
        }

        let graph = self
            .checkpoint
            .repo()
            .get_graph(&record.workflow_id)
            .await
            .map_err(|e| OrchestratorError::Repository(e.to_string()))?
            .ok_or(OrchestratorError::WorkflowNotFound(record.workflow_id))?;

        let done: HashSet<String> = self
            .checkpoint
            .completed_nodes(execution_id)
            .await?
            .into_iter()
            .collect();
        let ctx = ExecutionContext::from_value(record.context.clone()).without(WAIT_KEY);

        self.checkpoint
            .execution_status(execution_id, ExecutionStatus::Running, None, None)
            .await?;
        tracing::info!(%execution_id, resumed_after = ?record.resume_node_id, "execution resumed");

        let mut record = record;
        record.status = ExecutionStatus::Running;
        record.resume_at = None;
        record.resume_node_id = None;

        self.walk(graph, record, ctx, done).await
    }

    /// Resume every Waiting execution that has come due.
    ///
    /// Failures are logged per execution and never stop the sweep. Returns
    /// the number of executions resumed.
    pub async fn run_due_resumptions(&self, now: chrono::DateTime<Utc>) -> usize {
        let due = match self.checkpoint.repo().list_due_resumptions(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "failed to list due resumptions");
                return 0;
            }
        };

        let mut resumed = 0;
        for record in due {
            match self.resume(record.id).await {
                Ok(_) => resumed += 1,
                Err(e) => {
                    tracing::error!(execution_id = %record.id, error = %e, "resume failed");
                }
            }
        }
        resumed
    }

    // -----------------------------------------------------------------------
    // The walk
    // -----------------------------------------------------------------------

    async fn walk(
        &self,
        graph: WorkflowGraph,
        record: ExecutionRecord,
        mut ctx: ExecutionContext,
        done: HashSet<String>,
    ) -> Result<ExecutionRecord, OrchestratorError> {
        let adjacency = build_adjacency(&graph.connections);
        let order = match topo_sort(&graph.nodes, &graph.connections) {
            Ok(order) => order,
            Err(e) => return self.fail(record, &e.to_string(), &ctx).await,
        };

        let env = ExecutorEnv {
            execution_id: record.id,
            bus: self.bus.clone(),
            effects: self.effects.clone(),
            categories: self.categories.clone(),
            triggers: self.trigger_sink.get().cloned(),
        };

        // None until a branch decides; then only reachable nodes execute.
        let mut allowed: Option<HashSet<String>> = None;

        for (position, &node) in order.iter().enumerate() {
            if done.contains(&node.id) {
                continue;
            }
            if let Some(allowed) = &allowed {
                if !allowed.contains(&node.id) {
                    self.checkpoint.node_skipped(record.id, &node.id).await?;
                    continue;
                }
            }

            let executor = match self.registry.get(node.node_type) {
                Ok(executor) => executor,
                Err(e) => return self.fail(record, &e.to_string(), &ctx).await,
            };

            let mut attempt = 1;
            let output = loop {
                let log_id = self.checkpoint.node_start(record.id, &node.id, attempt).await?;

                let result =
                    match tokio::time::timeout(NODE_TIMEOUT, executor.execute(node, ctx.clone(), &env))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(super::registry::ExecutorError::Transient(format!(
                            "node '{}' timed out after {}s",
                            node.id,
                            NODE_TIMEOUT.as_secs()
                        ))),
                    };

                match result {
                    Ok(output) => {
                        let logged = output
                            .branch
                            .as_ref()
                            .map(|label| serde_json::json!({"branch": label}));
                        self.checkpoint.node_success(log_id, logged.as_ref()).await?;
                        break output;
                    }
                    Err(e) => {
                        self.checkpoint.node_failed(log_id, &e.to_string()).await?;
                        if e.is_retriable() && attempt < MAX_NODE_ATTEMPTS {
                            tracing::warn!(
                                execution_id = %record.id,
                                node_id = %node.id,
                                attempt,
                                error = %e,
                                "transient node failure, retrying"
                            );
                            attempt += 1;
                            continue;
                        }
                        let message = format!("node '{}' failed: {e}", node.id);
                        return self.fail(record, &message, &ctx).await;
                    }
                }
            };

            ctx = output.context;

            if let Some(label) = &output.branch {
                let seeds = next_node_ids(&adjacency, &node.id, Some(label));
                allowed = Some(reachable_from(&adjacency, &seeds));
            }

            if let Some(secs) = ctx.wait_request_secs() {
                // Pruned nodes sorted after this one have not been reached
                // yet. Checkpoint them skipped now, so the resumed walk
                // (which rebuilds its skip set from the logs) stays off the
                // untaken branch.
                if let Some(allowed) = &allowed {
                    for rest in &order[position + 1..] {
                        if !done.contains(&rest.id) && !allowed.contains(&rest.id) {
                            self.checkpoint.node_skipped(record.id, &rest.id).await?;
                        }
                    }
                }

                let resume_at = Utc::now() + chrono::Duration::seconds(secs as i64);
                let snapshot = ctx.without(WAIT_KEY).to_value();
                self.checkpoint
                    .execution_waiting(record.id, resume_at, &node.id, &snapshot)
                    .await?;
                self.bus.publish(EngineEvent::ExecutionWaiting {
                    execution_id: record.id,
                    node_id: node.id.clone(),
                    resume_at,
                });
                tracing::info!(execution_id = %record.id, node_id = %node.id, %resume_at, "execution waiting");

                let mut record = record;
                record.status = ExecutionStatus::Waiting;
                record.context = snapshot;
                record.resume_at = Some(resume_at);
                record.resume_node_id = Some(node.id.clone());
                return Ok(record);
            }
        }

        let snapshot = ctx.to_value();
        self.checkpoint
            .execution_status(record.id, ExecutionStatus::Success, None, Some(&snapshot))
            .await?;
        let duration_ms = (Utc::now() - record.started_at).num_milliseconds().max(0) as u64;
        self.bus.publish(EngineEvent::ExecutionCompleted {
            execution_id: record.id,
            workflow_id: record.workflow_id,
            duration_ms,
        });
        tracing::info!(execution_id = %record.id, duration_ms, "execution completed");

        let mut record = record;
        record.status = ExecutionStatus::Success;
        record.context = snapshot;
        record.completed_at = Some(Utc::now());
        Ok(record)
    }

    async fn fail(
        &self,
        mut record: ExecutionRecord,
        error: &str,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionRecord, OrchestratorError> {
        let snapshot = ctx.to_value();
        self.checkpoint
            .execution_status(record.id, ExecutionStatus::Failed, Some(error), Some(&snapshot))
            .await?;
        self.bus.publish(EngineEvent::ExecutionFailed {
            execution_id: record.id,
            workflow_id: record.workflow_id,
            error: error.to_string(),
        });
        tracing::error!(execution_id = %record.id, error, "execution failed");

        record.status = ExecutionStatus::Failed;
        record.error = Some(error.to_string());
        record.context = snapshot;
        record.completed_at = Some(Utc::now());
        Ok(record)
    }
}

impl<R: WorkflowRepository + 'static> ExecutionLauncher for Orchestrator<R> {
    fn launch(&self, workflow_id: Uuid, initial_context: Value) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self
                .run(workflow_id, ExecutionContext::from_value(initial_context))
                .await
            {
                Ok(record) => {
                    tracing::debug!(
                        %workflow_id,
                        execution_id = %record.id,
                        status = ?record.status,
                        "launched execution finished"
                    );
                }
                Err(e) => {
                    tracing::error!(%workflow_id, error = %e, "launched execution failed to start");
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{
        conn, test_node, MemoryRepo, MockEffects, NullCategories,
    };
    use flowline_types::workflow::{Connection, Node, NodeRunStatus, NodeType};
    use serde_json::json;

    fn graph(nodes: Vec<Node>, connections: Vec<Connection>) -> WorkflowGraph {
        WorkflowGraph {
            id: Uuid::now_v7(),
            name: "test workflow".to_string(),
            workspace_id: Uuid::now_v7(),
            active: true,
            nodes,
            connections,
        }
    }

    async fn orchestrator_with(
        graph_def: WorkflowGraph,
        effects: Arc<MockEffects>,
    ) -> (Arc<Orchestrator<MemoryRepo>>, Uuid) {
        let repo = MemoryRepo::default();
        repo.save_graph(&graph_def).await.unwrap();
        let workflow_id = graph_def.id;

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(CheckpointManager::new(repo)),
            Arc::new(ExecutorRegistry::builtin()),
            EventBus::new(64),
            effects,
            Arc::new(NullCategories),
        ));
        (orchestrator, workflow_id)
    }

    fn trigger_ctx(workspace_id: Uuid, payload: Value) -> ExecutionContext {
        ExecutionContext::for_trigger(
            workspace_id,
            NodeType::ContactCreated,
            0,
            Utc::now(),
            payload,
        )
    }

    // -------------------------------------------------------------------
    // Happy path
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn linear_graph_runs_to_success() {
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![
            test_node("t", NodeType::ContactCreated, json!({})),
            test_node("h", NodeType::HttpRequest, json!({"url": "https://api.test/x"})),
            test_node(
                "m",
                NodeType::SendMessage,
                json!({"channel": "email", "recipient": "a@b.c", "body": "hi"}),
            ),
        ];
        let connections = vec![conn("t", "main", "h"), conn("h", "main", "m")];
        let (orchestrator, workflow_id) = orchestrator_with(graph(nodes, connections), effects.clone()).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(effects.http_calls.lock().unwrap().len(), 1);
        assert_eq!(effects.message_calls.lock().unwrap().len(), 1);

        let done = orchestrator.checkpoint().completed_nodes(record.id).await.unwrap();
        assert_eq!(done, vec!["t".to_string(), "h".to_string(), "m".to_string()]);
    }

    // -------------------------------------------------------------------
    // Branching
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn branch_prunes_untaken_path() {
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![
            test_node("t", NodeType::ReviewReceived, json!({})),
            test_node(
                "b",
                NodeType::Branch,
                json!({"condition": {"field": "trigger.rating", "operator": "gte", "value": 4}}),
            ),
            test_node(
                "thank",
                NodeType::SendMessage,
                json!({"channel": "email", "recipient": "a@b.c", "body": "thanks!"}),
            ),
            test_node(
                "escalate",
                NodeType::SendMessage,
                json!({"channel": "email", "recipient": "owner@b.c", "body": "low rating"}),
            ),
        ];
        let connections = vec![
            conn("t", "main", "b"),
            conn("b", "true", "thank"),
            conn("b", "false", "escalate"),
        ];
        let (orchestrator, workflow_id) = orchestrator_with(graph(nodes, connections), effects.clone()).await;

        let ctx = ExecutionContext::for_trigger(
            Uuid::now_v7(),
            NodeType::ReviewReceived,
            0,
            Utc::now(),
            json!({"rating": 5}),
        );
        let record = orchestrator.run(workflow_id, ctx).await.unwrap();

        assert_eq!(record.status, ExecutionStatus::Success);
        let sends = effects.message_calls.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].body, "thanks!");

        // The untaken path is logged as skipped, never executed.
        let repo = orchestrator.checkpoint().repo();
        let logs = repo.logs_for(record.id);
        let escalate = logs.iter().find(|l| l.node_id == "escalate").unwrap();
        assert_eq!(escalate.status, NodeRunStatus::Skipped);
    }

    // -------------------------------------------------------------------
    // Validation failures
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn cycle_fails_before_any_node_executes() {
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![
            test_node("t", NodeType::ContactCreated, json!({})),
            test_node("a", NodeType::HttpRequest, json!({"url": "https://x.test"})),
            test_node("b", NodeType::HttpRequest, json!({"url": "https://y.test"})),
        ];
        let connections = vec![
            conn("t", "main", "a"),
            conn("a", "main", "b"),
            conn("b", "main", "a"),
        ];
        let (orchestrator, workflow_id) = orchestrator_with(graph(nodes, connections), effects.clone()).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        let error = record.error.unwrap();
        assert!(error.contains("cycle"), "error should mention cycle: {error}");
        assert!(error.contains('a') && error.contains('b'));
        assert!(effects.http_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_workflow_is_an_error() {
        let effects = Arc::new(MockEffects::default());
        let (orchestrator, _) = orchestrator_with(
            graph(vec![test_node("t", NodeType::ContactCreated, json!({}))], vec![]),
            effects,
        )
        .await;

        let err = orchestrator
            .run(Uuid::now_v7(), ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowNotFound(_)));
    }

    // -------------------------------------------------------------------
    // Retry behavior
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let effects = Arc::new(MockEffects::failing_times(2));
        let nodes = vec![
            test_node("t", NodeType::ContactCreated, json!({})),
            test_node("h", NodeType::HttpRequest, json!({"url": "https://x.test"})),
        ];
        let (orchestrator, workflow_id) =
            orchestrator_with(graph(nodes, vec![conn("t", "main", "h")]), effects.clone()).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Success);
        // 2 failures + 1 success.
        assert_eq!(effects.http_calls.lock().unwrap().len(), 3);

        let logs = orchestrator.checkpoint().repo().logs_for(record.id);
        let attempts: Vec<u32> = logs.iter().filter(|l| l.node_id == "h").map(|l| l.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_run() {
        let effects = Arc::new(MockEffects::failing_times(10));
        let nodes = vec![
            test_node("t", NodeType::ContactCreated, json!({})),
            test_node("h", NodeType::HttpRequest, json!({"url": "https://x.test"})),
        ];
        let (orchestrator, workflow_id) =
            orchestrator_with(graph(nodes, vec![conn("t", "main", "h")]), effects.clone()).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(
            effects.http_calls.lock().unwrap().len(),
            MAX_NODE_ATTEMPTS as usize
        );
    }

    #[tokio::test]
    async fn config_error_fails_without_retry() {
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![
            test_node("t", NodeType::ContactCreated, json!({})),
            test_node("h", NodeType::HttpRequest, json!({})), // no url
        ];
        let (orchestrator, workflow_id) =
            orchestrator_with(graph(nodes, vec![conn("t", "main", "h")]), effects.clone()).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        let logs = orchestrator.checkpoint().repo().logs_for(record.id);
        let h_attempts = logs.iter().filter(|l| l.node_id == "h").count();
        assert_eq!(h_attempts, 1, "config errors must not retry");
    }

    // -------------------------------------------------------------------
    // Wait / resume
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn wait_suspends_and_resume_completes() {
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![
            test_node("t", NodeType::ContactCreated, json!({})),
            test_node("w", NodeType::Wait, json!({"duration": 30, "unit": "seconds"})),
            test_node(
                "m",
                NodeType::SendMessage,
                json!({"channel": "email", "recipient": "a@b.c", "body": "later"}),
            ),
        ];
        let connections = vec![conn("t", "main", "w"), conn("w", "main", "m")];
        let (orchestrator, workflow_id) = orchestrator_with(graph(nodes, connections), effects.clone()).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Waiting);
        assert_eq!(record.resume_node_id.as_deref(), Some("w"));
        assert!(record.resume_at.is_some());
        assert!(effects.message_calls.lock().unwrap().is_empty());

        let resumed = orchestrator.resume(record.id).await.unwrap();
        assert_eq!(resumed.status, ExecutionStatus::Success);
        assert_eq!(effects.message_calls.lock().unwrap().len(), 1);

        // The wait node completed before suspension; resume must not rerun it.
        let logs = orchestrator.checkpoint().repo().logs_for(record.id);
        let wait_runs = logs
            .iter()
            .filter(|l| l.node_id == "w" && l.status == NodeRunStatus::Success)
            .count();
        assert_eq!(wait_runs, 1);
    }

    #[tokio::test]
    async fn branch_pruning_survives_wait_suspension() {
        // The untaken side sorts after the wait node, so it is still ahead
        // of the walk when the run suspends. It must stay pruned on resume.
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![
            test_node("t", NodeType::ReviewReceived, json!({})),
            test_node(
                "b",
                NodeType::Branch,
                json!({"condition": {"field": "trigger.rating", "operator": "gte", "value": 4}}),
            ),
            test_node(
                "escalate",
                NodeType::SendMessage,
                json!({"channel": "email", "recipient": "owner@b.c", "body": "low rating"}),
            ),
            test_node("w", NodeType::Wait, json!({"duration": 30, "unit": "seconds"})),
            test_node(
                "m",
                NodeType::SendMessage,
                json!({"channel": "email", "recipient": "a@b.c", "body": "follow-up"}),
            ),
        ];
        let connections = vec![
            conn("t", "main", "b"),
            conn("b", "false", "escalate"),
            conn("b", "true", "w"),
            conn("w", "main", "m"),
        ];
        let (orchestrator, workflow_id) = orchestrator_with(graph(nodes, connections), effects.clone()).await;

        let ctx = ExecutionContext::for_trigger(
            Uuid::now_v7(),
            NodeType::ReviewReceived,
            0,
            Utc::now(),
            json!({"rating": 5}),
        );
        let record = orchestrator.run(workflow_id, ctx).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Waiting);

        // The pruned node is already checkpointed skipped at suspension.
        let repo = orchestrator.checkpoint().repo();
        let logs = repo.logs_for(record.id);
        let escalate = logs.iter().find(|l| l.node_id == "escalate").unwrap();
        assert_eq!(escalate.status, NodeRunStatus::Skipped);

        let resumed = orchestrator.resume(record.id).await.unwrap();
        assert_eq!(resumed.status, ExecutionStatus::Success);

        let sends = effects.message_calls.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].body, "follow-up");
    }

    #[tokio::test]
    async fn resume_rejects_non_waiting_execution() {
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![test_node("t", NodeType::ContactCreated, json!({}))];
        let (orchestrator, workflow_id) = orchestrator_with(graph(nodes, vec![]), effects).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Success);

        let err = orchestrator.resume(record.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotWaiting(_)));
    }

    #[tokio::test]
    async fn due_resumptions_sweep_resumes_waiting_runs() {
        let effects = Arc::new(MockEffects::default());
        let nodes = vec![
            test_node("t", NodeType::ContactCreated, json!({})),
            test_node("w", NodeType::Wait, json!({"duration": 1, "unit": "seconds"})),
        ];
        let (orchestrator, workflow_id) =
            orchestrator_with(graph(nodes, vec![conn("t", "main", "w")]), effects).await;

        let record = orchestrator
            .run(workflow_id, trigger_ctx(Uuid::now_v7(), json!({})))
            .await
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Waiting);

        // Not yet due.
        assert_eq!(orchestrator.run_due_resumptions(Utc::now()).await, 0);

        // Past the resume time.
        let later = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(orchestrator.run_due_resumptions(later).await, 1);
    }
}
