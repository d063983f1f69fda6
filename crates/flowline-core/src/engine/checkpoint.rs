//! Durable checkpoint manager for execution state.
//!
//! Wraps `WorkflowRepository` to provide a higher-level API for recording
//! node-level execution checkpoints. Each node transition (running ->
//! success/failed/skipped) is persisted before the walk moves forward, so a
//! suspended or crashed execution can resume from the last completed node.

use chrono::{DateTime, Utc};
use flowline_types::workflow::{ExecutionStatus, NodeRunLog, NodeRunStatus};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::workflow::WorkflowRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints.
///
/// Generic over `R: WorkflowRepository` so it works with any storage backend
/// (SQLite, in-memory mock, etc.).
pub struct CheckpointManager<R: WorkflowRepository> {
    repo: R,
}

impl<R: WorkflowRepository> CheckpointManager<R> {
    /// Create a new checkpoint manager backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Node-level checkpoints
    // -----------------------------------------------------------------------

    /// Checkpoint a node attempt as starting. Returns the log entry ID.
    pub async fn node_start(
        &self,
        execution_id: Uuid,
        node_id: &str,
        attempt: u32,
    ) -> Result<Uuid, CheckpointError> {
        let log_id = Uuid::now_v7();
        let log = NodeRunLog {
            id: log_id,
            execution_id,
            node_id: node_id.to_string(),
            status: NodeRunStatus::Running,
            attempt,
            idempotency_key: Some(format!("{execution_id}-{node_id}-{attempt}")),
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        };

        self.repo
            .create_node_log(&log)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(%execution_id, node_id, attempt, log_id = %log_id, "checkpointed node start");
        Ok(log_id)
    }

    /// Checkpoint a node attempt as succeeded.
    pub async fn node_success(
        &self,
        log_id: Uuid,
        output: Option<&Value>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_node_log(&log_id, NodeRunStatus::Success, output, None)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(log_id = %log_id, "checkpointed node success");
        Ok(())
    }

    /// Checkpoint a node attempt as failed.
    pub async fn node_failed(&self, log_id: Uuid, error: &str) -> Result<(), CheckpointError> {
        self.repo
            .update_node_log(&log_id, NodeRunStatus::Failed, None, Some(error))
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(log_id = %log_id, error, "checkpointed node failure");
        Ok(())
    }

    /// Checkpoint a node as skipped (pruned by a branch decision).
    pub async fn node_skipped(
        &self,
        execution_id: Uuid,
        node_id: &str,
    ) -> Result<(), CheckpointError> {
        let log = NodeRunLog {
            id: Uuid::now_v7(),
            execution_id,
            node_id: node_id.to_string(),
            status: NodeRunStatus::Skipped,
            attempt: 0,
            idempotency_key: None,
            output: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        };

        self.repo
            .create_node_log(&log)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(%execution_id, node_id, "checkpointed node skipped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Execution-level checkpoints
    // -----------------------------------------------------------------------

    /// Update the overall execution status and optionally the context snapshot.
    pub async fn execution_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_execution_status(&execution_id, status, error, context)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(%execution_id, status = ?status, "checkpointed execution status");
        Ok(())
    }

    /// Suspend an execution as Waiting until `resume_at`.
    pub async fn execution_waiting(
        &self,
        execution_id: Uuid,
        resume_at: DateTime<Utc>,
        resume_node_id: &str,
        context: &Value,
    ) -> Result<(), CheckpointError> {
        self.repo
            .schedule_resume(&execution_id, resume_at, resume_node_id, context)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(%execution_id, %resume_at, resume_node_id, "checkpointed execution waiting");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recovery helpers
    // -----------------------------------------------------------------------

    /// Node IDs that finished (succeeded or were skipped) in an execution.
    pub async fn completed_nodes(&self, execution_id: Uuid) -> Result<Vec<String>, CheckpointError> {
        self.repo
            .completed_node_ids(&execution_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Restore the context snapshot from a persisted execution.
    pub async fn restore_context(&self, execution_id: Uuid) -> Result<Value, CheckpointError> {
        let record = self
            .repo
            .get_execution(&execution_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::ExecutionNotFound(execution_id))?;

        Ok(record.context)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// Execution not found (for restore operations).
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
