//! Trigger dispatcher: routes business events into workflow launches.
//!
//! `dispatch` is fire-and-forget. It never returns an error to the event
//! producer: lookup failures are logged, filter mismatches are silent, and
//! each matched workflow launches in its own spawned task so one failure
//! cannot block the others. A depth guard stops runaway
//! workflow-triggers-workflow chains.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use flowline_types::event::EngineEvent;
use flowline_types::workflow::{NodeType, TriggerEvent, MAX_TRIGGER_DEPTH};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use super::coalescer::BatchCoalescer;
use super::context::ExecutionContext;
use super::filters;
use super::orchestrator::ExecutionLauncher;
use crate::event::EventBus;
use crate::repository::workflow::WorkflowRepository;

/// Object-safe trigger entry point.
///
/// Implemented by [`TriggerDispatcher`] and handed to executors that chain
/// workflow-to-workflow firings.
pub trait TriggerSink: Send + Sync {
    fn fire(&self, event: TriggerEvent) -> BoxFuture<'_, ()>;
}

/// Routes trigger events to the workflows listening for them.
pub struct TriggerDispatcher<R: WorkflowRepository> {
    repo: R,
    launcher: Arc<dyn ExecutionLauncher>,
    /// When present, bulk-prone triggers are debounced instead of launching
    /// one execution per event.
    coalescer: Option<Arc<BatchCoalescer>>,
    bus: EventBus,
}

impl<R: WorkflowRepository> TriggerDispatcher<R> {
    pub fn new(repo: R, launcher: Arc<dyn ExecutionLauncher>, bus: EventBus) -> Self {
        Self {
            repo,
            launcher,
            coalescer: None,
            bus,
        }
    }

    /// Route bulk-prone triggers through a batch coalescer.
    pub fn with_coalescer(mut self, coalescer: Arc<BatchCoalescer>) -> Self {
        self.coalescer = Some(coalescer);
        self
    }

    /// Dispatch one trigger event. Never errors; all failures are logged.
    pub async fn dispatch(&self, event: TriggerEvent) {
        if event.depth >= MAX_TRIGGER_DEPTH {
            tracing::warn!(
                trigger_type = ?event.trigger_type,
                depth = event.depth,
                workspace_id = %event.workspace_id,
                "dropping trigger event at depth limit"
            );
            self.bus.publish(EngineEvent::TriggerDepthExceeded {
                trigger_type: event.trigger_type,
                depth: event.depth,
            });
            return;
        }

        let nodes = match self
            .repo
            .find_trigger_nodes(event.trigger_type, &event.workspace_id)
            .await
        {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::error!(
                    trigger_type = ?event.trigger_type,
                    workspace_id = %event.workspace_id,
                    error = %e,
                    "trigger node lookup failed, dropping event"
                );
                return;
            }
        };

        // One launch per workflow, even when several of its trigger nodes match.
        let mut seen_workflows: HashSet<Uuid> = HashSet::new();

        for node in nodes {
            if !seen_workflows.insert(node.workflow_id) {
                continue;
            }
            if !filters::matches(event.trigger_type, node.data.get("filter"), &event.payload) {
                tracing::debug!(
                    workflow_id = %node.workflow_id,
                    node_id = %node.id,
                    "trigger filter did not match"
                );
                continue;
            }

            self.bus.publish(EngineEvent::TriggerMatched {
                workflow_id: node.workflow_id,
                workspace_id: event.workspace_id,
                trigger_type: event.trigger_type,
            });

            if event.trigger_type == NodeType::ContactCreated {
                if let Some(coalescer) = &self.coalescer {
                    coalescer.enqueue(node.workflow_id, &event).await;
                    continue;
                }
            }

            let initial = ExecutionContext::for_trigger(
                event.workspace_id,
                event.trigger_type,
                event.depth,
                Utc::now(),
                event.payload.clone(),
            )
            .to_value();

            let launcher = self.launcher.clone();
            let workflow_id = node.workflow_id;
            tokio::spawn(async move {
                launcher.launch(workflow_id, initial).await;
            });
        }
    }
}

impl<R: WorkflowRepository + 'static> TriggerSink for TriggerDispatcher<R> {
    fn fire(&self, event: TriggerEvent) -> BoxFuture<'_, ()> {
        Box::pin(self.dispatch(event))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
