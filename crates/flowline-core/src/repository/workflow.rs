//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow graphs, execution records,
//! and node run logs. The infrastructure layer (flowline-infra) implements
//! this trait with SQLite persistence.

use chrono::{DateTime, Utc};
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{
    ExecutionRecord, ExecutionStatus, Node, NodeRunLog, NodeRunStatus, NodeType, WorkflowGraph,
};
use serde_json::Value;
use uuid::Uuid;

/// A schedule trigger node together with the workspace its workflow lives in.
///
/// The schedule checker needs the workspace to build the launch context; the
/// node alone only knows its workflow.
#[derive(Debug, Clone)]
pub struct ScheduleBinding {
    pub node: Node,
    pub workspace_id: Uuid,
}

/// Repository trait for workflow persistence.
///
/// Covers three entity families:
/// - **Graphs:** Load workflow graphs and look up trigger nodes.
/// - **Executions:** Create/update/query execution records.
/// - **Node logs:** Create/update/query per-node attempt logs.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Graphs
    // -----------------------------------------------------------------------

    /// Persist a workflow graph (insert or replace by ID).
    fn save_graph(
        &self,
        graph: &WorkflowGraph,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load a workflow graph by its UUID. Always reads fresh from storage.
    fn get_graph(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowGraph>, RepositoryError>> + Send;

    /// Find trigger nodes of the given kind across *active* workflows of a
    /// workspace. Inactive workflows never match.
    fn find_trigger_nodes(
        &self,
        trigger_type: NodeType,
        workspace_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Node>, RepositoryError>> + Send;

    /// List every schedule trigger node across active workflows, with its
    /// workspace. Driven by the schedule checker each minute.
    fn list_schedule_nodes(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ScheduleBinding>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Create a new execution record.
    fn create_execution(
        &self,
        record: &ExecutionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update an execution's status (and optionally error / context snapshot).
    fn update_execution_status(
        &self,
        execution_id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Suspend an execution: mark it Waiting with a due time, the node that
    /// suspended it, and the context snapshot to resume from.
    fn schedule_resume(
        &self,
        execution_id: &Uuid,
        resume_at: DateTime<Utc>,
        resume_node_id: &str,
        context: &Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution record by its UUID.
    fn get_execution(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionRecord>, RepositoryError>> + Send;

    /// List Waiting executions whose `resume_at` has passed.
    fn list_due_resumptions(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionRecord>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Node logs
    // -----------------------------------------------------------------------

    /// Create a new node run log entry.
    fn create_node_log(
        &self,
        log: &NodeRunLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a node log's status (and optionally output / error).
    fn update_node_log(
        &self,
        log_id: &Uuid,
        status: NodeRunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Node IDs that finished in an execution (succeeded or skipped by a
    /// branch decision), in completion order. Used when resuming a Waiting
    /// execution so neither executed nor pruned nodes run again.
    fn completed_node_ids(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
