//! Workflow domain types for Flowline.
//!
//! A workflow is a directed graph of typed nodes wired by labeled
//! connections. This module contains the graph shape (`WorkflowGraph`,
//! `Node`, `Connection`), execution tracking (`ExecutionRecord`,
//! `NodeRunLog`), trigger events, branch conditions, and the recurrence
//! types shared by the schedule and recurring-campaign checkers.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node and graph shape
// ---------------------------------------------------------------------------

/// The kind of a workflow node.
///
/// Trigger kinds start a workflow in response to an event; action kinds do
/// work during the walk. The orchestrator treats the two sets differently
/// (triggers are entry points, actions are durable steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    // Triggers
    ContactCreated,
    ReviewReceived,
    MessageReceived,
    FormSubmitted,
    PaymentReceived,
    StageChanged,
    Schedule,
    // Actions
    HttpRequest,
    GenerateText,
    SendMessage,
    Wait,
    Branch,
}

impl NodeType {
    /// Whether this kind is a trigger (workflow entry point).
    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            NodeType::ContactCreated
                | NodeType::ReviewReceived
                | NodeType::MessageReceived
                | NodeType::FormSubmitted
                | NodeType::PaymentReceived
                | NodeType::StageChanged
                | NodeType::Schedule
        )
    }
}

/// A single node in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// User-defined node ID (e.g. "send-welcome"). Unique within a workflow.
    pub id: String,
    /// The kind of node.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Node-specific configuration payload. Trigger nodes carry their filter
    /// under `filter`, schedule nodes their recurrence rule under `schedule`.
    #[serde(default)]
    pub data: Value,
    /// The workflow this node belongs to.
    pub workflow_id: Uuid,
}

/// A directed, labeled edge between two nodes.
///
/// `from_output` names the output port on the source node. Plain nodes emit
/// on `main`; branch nodes emit on `true` or `false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub from_node_id: String,
    #[serde(default = "default_output")]
    pub from_output: String,
    pub to_node_id: String,
}

fn default_output() -> String {
    "main".to_string()
}

/// The default output port label.
pub const MAIN_OUTPUT: &str = "main";

/// A complete workflow graph as stored.
///
/// Rebuilt from storage at every execution start; never cached between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// The workspace (tenant) this workflow belongs to.
    pub workspace_id: Uuid,
    /// Inactive workflows are invisible to triggers and checkers.
    pub active: bool,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

// ---------------------------------------------------------------------------
// Execution tracking
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    /// Durably suspended by a wait node; resumed once `resume_at` passes.
    Waiting,
    Success,
    Failed,
}

impl ExecutionStatus {
    /// Whether the execution has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

/// A single execution of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Denormalized for log readability.
    pub workflow_name: String,
    pub status: ExecutionStatus,
    /// Context snapshot (JSON object). Updated at every durable checkpoint.
    pub context: Value,
    /// Terminal error message when status is Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// When a Waiting execution becomes due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    /// The wait node that suspended the execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_node_id: Option<String>,
}

impl ExecutionRecord {
    /// Create a fresh Pending record for a workflow.
    pub fn new(workflow_id: Uuid, workflow_name: &str, context: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            workflow_name: workflow_name.to_string(),
            status: ExecutionStatus::Pending,
            context,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            resume_at: None,
            resume_node_id: None,
        }
    }
}

/// Status of a single node run within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// Pruned by a branch decision; executor never invoked.
    Skipped,
}

/// Durable log entry for one node attempt within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunLog {
    /// UUIDv7 log entry ID.
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: NodeRunStatus,
    /// 1-based attempt counter (0 for skipped entries).
    pub attempt: u32,
    /// `{execution_id}-{node_id}-{attempt}`, used to fence duplicate writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Trigger events
// ---------------------------------------------------------------------------

/// Maximum workflow-to-workflow trigger chain depth.
///
/// An event at depth >= 3 is dropped by the dispatcher, and executors that
/// would emit a downstream trigger refuse to fire it.
pub const MAX_TRIGGER_DEPTH: u8 = 3;

/// A business event entering the trigger dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// The trigger kind this event maps to (always a trigger `NodeType`).
    pub trigger_type: NodeType,
    /// Event payload; shape depends on the trigger kind.
    #[serde(default)]
    pub payload: Value,
    pub workspace_id: Uuid,
    /// Chain depth: 0 for external events, incremented by each
    /// workflow-caused re-entry.
    #[serde(default)]
    pub depth: u8,
}

impl TriggerEvent {
    /// An external (depth 0) event.
    pub fn external(trigger_type: NodeType, workspace_id: Uuid, payload: Value) -> Self {
        Self {
            trigger_type,
            payload,
            workspace_id,
            depth: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Comparison operator for branch conditions and trigger filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Exists,
    NotExists,
    In,
    /// Membership of the context's contact in a named category. The only
    /// operator that needs a data-source lookup; evaluates false on any
    /// lookup failure.
    InCategory,
}

/// A single condition evaluated against the execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-path into the context (e.g. "trigger.contact.email").
    pub field: String,
    pub operator: ConditionOperator,
    /// Comparison operand. Unused by exists/not_exists.
    #[serde(default)]
    pub value: Value,
}

// ---------------------------------------------------------------------------
// Recurrence
// ---------------------------------------------------------------------------

/// How often a recurrence rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// An explicit recurrence rule (UTC).
///
/// Shared by schedule trigger nodes (minute granularity) and recurring
/// campaigns (hour granularity).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Minute of hour, 0-59. Ignored at hour granularity.
    #[serde(default)]
    pub minute: u32,
    /// Weekly only: day of week, 0 = Monday .. 6 = Sunday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    /// Monthly only: day of month, 1-31. Months shorter than the configured
    /// day fire on their last day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
}

impl RecurrenceRule {
    /// The day of month this rule fires on for the month containing `now`,
    /// clamping past-end days to the month's last day.
    pub fn effective_day_of_month(&self, now: DateTime<Utc>) -> Option<u32> {
        let configured = self.day_of_month?;
        Some(configured.min(days_in_month(now.year(), now.month())))
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Recurring campaigns
// ---------------------------------------------------------------------------

/// A campaign that re-materializes as a one-shot send on each recurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringCampaign {
    /// UUIDv7 campaign ID.
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub rule: RecurrenceRule,
    /// Message template cloned into each one-shot send.
    #[serde(default)]
    pub template: Value,
    /// Recurrence stops once this passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Last time the checker materialized a one-shot from this campaign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_recurred_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
