//! Shared test fixtures for the engine modules.
//!
//! In-memory repositories, a scripted `SideEffects` mock, and collecting
//! implementations of the launcher/sink ports. Everything here is cheap to
//! clone so tests can hold a handle while the component under test owns
//! another.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{
    Connection, ExecutionRecord, ExecutionStatus, Node, NodeRunLog, NodeRunStatus, NodeType,
    RecurringCampaign, TriggerEvent, WorkflowGraph,
};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use uuid::Uuid;

use super::condition::CategoryLookup;
use super::dispatcher::TriggerSink;
use super::effects::SideEffects;
use super::orchestrator::ExecutionLauncher;
use super::recurring::SendPipeline;
use super::registry::{ExecutorEnv, ExecutorError};
use crate::event::EventBus;
use crate::repository::campaign::CampaignRepository;
use crate::repository::workflow::{ScheduleBinding, WorkflowRepository};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn test_node(id: &str, node_type: NodeType, data: Value) -> Node {
    Node {
        id: id.to_string(),
        node_type,
        data,
        workflow_id: Uuid::nil(),
    }
}

pub fn conn(from: &str, output: &str, to: &str) -> Connection {
    Connection {
        from_node_id: from.to_string(),
        from_output: output.to_string(),
        to_node_id: to.to_string(),
    }
}

/// An executor environment with a fresh mock behind every port.
pub fn test_env() -> ExecutorEnv {
    env_with_effects(Arc::new(MockEffects::default()))
}

pub fn env_with_effects(effects: Arc<MockEffects>) -> ExecutorEnv {
    ExecutorEnv {
        execution_id: Uuid::now_v7(),
        bus: EventBus::new(64),
        effects,
        categories: Arc::new(NullCategories),
        triggers: None,
    }
}

// ---------------------------------------------------------------------------
// Side-effect mock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageCall {
    pub channel: String,
    pub recipient: String,
    pub body: String,
}

/// Records every outbound call; optionally fails the first N calls with a
/// transient error to exercise the retry loop.
#[derive(Default)]
pub struct MockEffects {
    pub http_calls: Mutex<Vec<HttpCall>>,
    pub text_calls: Mutex<Vec<String>>,
    pub message_calls: Mutex<Vec<MessageCall>>,
    failures_left: AtomicUsize,
}

impl MockEffects {
    /// A mock whose first `n` calls (of any kind) fail transiently.
    pub fn failing_times(n: usize) -> Self {
        let effects = Self::default();
        effects.failures_left.store(n, Ordering::SeqCst);
        effects
    }

    fn maybe_fail(&self) -> Result<(), ExecutorError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ExecutorError::Transient("scripted failure".to_string()));
        }
        Ok(())
    }
}

impl SideEffects for MockEffects {
    fn http_request<'a>(
        &'a self,
        method: &'a str,
        url: &'a str,
        _headers: &'a HashMap<String, String>,
        body: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>> {
        Box::pin(async move {
            self.http_calls.lock().unwrap().push(HttpCall {
                method: method.to_string(),
                url: url.to_string(),
                body: body.map(str::to_string),
            });
            self.maybe_fail()?;
            Ok(json!({"status": 200, "headers": {}, "body": {"ok": true}}))
        })
    }

    fn generate_text<'a>(
        &'a self,
        prompt: &'a str,
        _model: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ExecutorError>> {
        Box::pin(async move {
            self.text_calls.lock().unwrap().push(prompt.to_string());
            self.maybe_fail()?;
            Ok(format!("generated for: {prompt}"))
        })
    }

    fn send_message<'a>(
        &'a self,
        channel: &'a str,
        recipient: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<Value, ExecutorError>> {
        Box::pin(async move {
            self.message_calls.lock().unwrap().push(MessageCall {
                channel: channel.to_string(),
                recipient: recipient.to_string(),
                body: body.to_string(),
            });
            self.maybe_fail()?;
            Ok(json!({"delivered": true, "channel": channel}))
        })
    }
}

/// A category lookup where no contact belongs to anything.
pub struct NullCategories;

impl CategoryLookup for NullCategories {
    fn contact_in_category<'a>(
        &'a self,
        _workspace_id: Uuid,
        _contact_id: Uuid,
        _category: &'a str,
    ) -> BoxFuture<'a, Result<bool, RepositoryError>> {
        Box::pin(async { Ok(false) })
    }
}

// ---------------------------------------------------------------------------
// Port collectors
// ---------------------------------------------------------------------------

/// Records launches instead of running anything.
#[derive(Default)]
pub struct CollectingLauncher {
    pub launches: Mutex<Vec<(Uuid, Value)>>,
}

impl CollectingLauncher {
    /// Poll until at least `count` launches were recorded or the timeout
    /// elapses. Spawned launch tasks land here asynchronously.
    pub async fn wait_for(&self, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.launches.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl ExecutionLauncher for CollectingLauncher {
    fn launch(&self, workflow_id: Uuid, initial_context: Value) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.launches.lock().unwrap().push((workflow_id, initial_context));
        })
    }
}

/// Records fired trigger events.
#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<TriggerEvent>>,
}

impl TriggerSink for CollectingSink {
    fn fire(&self, event: TriggerEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.events.lock().unwrap().push(event);
        })
    }
}

/// Records dispatched one-shot sends.
#[derive(Default)]
pub struct CollectingPipeline {
    pub dispatched: Mutex<Vec<(Uuid, Uuid)>>,
}

impl SendPipeline for CollectingPipeline {
    fn dispatch(&self, one_shot_id: Uuid, workspace_id: Uuid) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.dispatched.lock().unwrap().push((one_shot_id, workspace_id));
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory workflow repository
// ---------------------------------------------------------------------------

/// In-memory `WorkflowRepository`. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryRepo {
    graphs: Arc<Mutex<HashMap<Uuid, WorkflowGraph>>>,
    executions: Arc<Mutex<HashMap<Uuid, ExecutionRecord>>>,
    logs: Arc<Mutex<Vec<NodeRunLog>>>,
}

impl MemoryRepo {
    /// Every node log recorded for an execution, in insertion order.
    pub fn logs_for(&self, execution_id: Uuid) -> Vec<NodeRunLog> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.execution_id == execution_id)
            .cloned()
            .collect()
    }
}

impl WorkflowRepository for MemoryRepo {
    async fn save_graph(&self, graph: &WorkflowGraph) -> Result<(), RepositoryError> {
        // Like the SQL index table, stored nodes carry their owning workflow.
        let mut graph = graph.clone();
        let workflow_id = graph.id;
        for node in &mut graph.nodes {
            node.workflow_id = workflow_id;
        }
        self.graphs.lock().unwrap().insert(workflow_id, graph);
        Ok(())
    }

    async fn get_graph(&self, id: &Uuid) -> Result<Option<WorkflowGraph>, RepositoryError> {
        Ok(self.graphs.lock().unwrap().get(id).cloned())
    }

    async fn find_trigger_nodes(
        &self,
        trigger_type: NodeType,
        workspace_id: &Uuid,
    ) -> Result<Vec<Node>, RepositoryError> {
        Ok(self
            .graphs
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.active && g.workspace_id == *workspace_id)
            .flat_map(|g| g.nodes.iter())
            .filter(|n| n.node_type == trigger_type)
            .cloned()
            .collect())
    }

    async fn list_schedule_nodes(&self) -> Result<Vec<ScheduleBinding>, RepositoryError> {
        Ok(self
            .graphs
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.active)
            .flat_map(|g| {
                g.nodes
                    .iter()
                    .filter(|n| n.node_type == NodeType::Schedule)
                    .map(|n| ScheduleBinding {
                        node: n.clone(),
                        workspace_id: g.workspace_id,
                    })
            })
            .collect())
    }

    async fn create_execution(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        self.executions.lock().unwrap().insert(record.id, record.clone());
        Ok(())
    }

    async fn update_execution_status(
        &self,
        execution_id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        context: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        let record = executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        record.status = status;
        record.error = error.map(str::to_string);
        if let Some(context) = context {
            record.context = context.clone();
        }
        if status != ExecutionStatus::Waiting {
            record.resume_at = None;
            record.resume_node_id = None;
        }
        if status.is_terminal() {
            record.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn schedule_resume(
        &self,
        execution_id: &Uuid,
        resume_at: DateTime<Utc>,
        resume_node_id: &str,
        context: &Value,
    ) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        let record = executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        record.status = ExecutionStatus::Waiting;
        record.resume_at = Some(resume_at);
        record.resume_node_id = Some(resume_node_id.to_string());
        record.context = context.clone();
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<Option<ExecutionRecord>, RepositoryError> {
        Ok(self.executions.lock().unwrap().get(execution_id).cloned())
    }

    async fn list_due_resumptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.status == ExecutionStatus::Waiting
                    && r.resume_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect())
    }

    async fn create_node_log(&self, log: &NodeRunLog) -> Result<(), RepositoryError> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn update_node_log(
        &self,
        log_id: &Uuid,
        status: NodeRunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs
            .iter_mut()
            .find(|l| l.id == *log_id)
            .ok_or(RepositoryError::NotFound)?;
        log.status = status;
        log.output = output.cloned();
        log.error = error.map(str::to_string);
        log.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn completed_node_ids(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<String>, RepositoryError> {
        let mut seen = HashSet::new();
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| {
                l.execution_id == *execution_id
                    && matches!(l.status, NodeRunStatus::Success | NodeRunStatus::Skipped)
            })
            .filter(|l| seen.insert(l.node_id.clone()))
            .map(|l| l.node_id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory campaign repository
// ---------------------------------------------------------------------------

/// In-memory `CampaignRepository`. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryCampaignRepo {
    campaigns: Arc<Mutex<Vec<RecurringCampaign>>>,
    /// (one-shot id, parent campaign id) pairs, in creation order.
    pub one_shots: Arc<Mutex<Vec<(Uuid, Uuid)>>>,
    failing: Arc<Mutex<HashSet<Uuid>>>,
}

impl MemoryCampaignRepo {
    pub fn get(&self, id: &Uuid) -> Option<RecurringCampaign> {
        self.campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == *id)
            .cloned()
    }

    /// Make `create_one_shot` fail for the given parent campaign.
    pub fn fail_one_shot_for(&self, campaign_id: Uuid) {
        self.failing.lock().unwrap().insert(campaign_id);
    }
}

impl CampaignRepository for MemoryCampaignRepo {
    async fn save_campaign(&self, campaign: &RecurringCampaign) -> Result<(), RepositoryError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns.iter_mut().find(|c| c.id == campaign.id) {
            Some(existing) => *existing = campaign.clone(),
            None => campaigns.push(campaign.clone()),
        }
        Ok(())
    }

    async fn list_recurring(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecurringCampaign>, RepositoryError> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.expires_at.is_none_or(|at| at > now))
            .cloned()
            .collect())
    }

    async fn create_one_shot(
        &self,
        parent: &RecurringCampaign,
        _at: DateTime<Utc>,
    ) -> Result<Uuid, RepositoryError> {
        if self.failing.lock().unwrap().contains(&parent.id) {
            return Err(RepositoryError::Query("scripted failure".to_string()));
        }
        let one_shot_id = Uuid::now_v7();
        self.one_shots.lock().unwrap().push((one_shot_id, parent.id));
        Ok(one_shot_id)
    }

    async fn mark_recurred(
        &self,
        campaign_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign = campaigns
            .iter_mut()
            .find(|c| c.id == *campaign_id)
            .ok_or(RepositoryError::NotFound)?;
        campaign.last_recurred_at = Some(at);
        Ok(())
    }
}
