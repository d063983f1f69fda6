//! Event types for the Flowline engine event bus.
//!
//! `EngineEvent` is the unified event type broadcast during workflow
//! execution. All variants are Clone + Send + Sync for use with tokio
//! broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::NodeType;

/// Per-node status surfaced to subscribers (UI, logging).
///
/// Side-effecting executors publish `Loading` before their outbound call and
/// exactly one of `Success` / `Error` after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatusKind {
    Loading,
    Success,
    Error,
}

/// Events emitted during workflow execution and trigger dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An execution has started running.
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
    },

    /// A node changed status.
    NodeStatus {
        execution_id: Uuid,
        node_id: String,
        status: NodeStatusKind,
    },

    /// An execution suspended on a wait node.
    ExecutionWaiting {
        execution_id: Uuid,
        node_id: String,
        resume_at: DateTime<Utc>,
    },

    /// An execution finished successfully.
    ExecutionCompleted {
        execution_id: Uuid,
        workflow_id: Uuid,
        duration_ms: u64,
    },

    /// An execution failed terminally.
    ExecutionFailed {
        execution_id: Uuid,
        workflow_id: Uuid,
        error: String,
    },

    /// A trigger event matched a workflow and a launch was dispatched.
    TriggerMatched {
        workflow_id: Uuid,
        workspace_id: Uuid,
        trigger_type: NodeType,
    },

    /// A trigger event was dropped because its chain depth hit the limit.
    TriggerDepthExceeded { trigger_type: NodeType, depth: u8 },

    /// A coalesced batch was flushed into a single launch.
    BatchFlushed {
        workflow_id: Uuid,
        workspace_id: Uuid,
        subjects: usize,
    },
}
