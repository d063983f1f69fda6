//! Batch coalescer: debounces bulk trigger events into single launches.
//!
//! A contact import can raise hundreds of `contact_created` events within
//! seconds. Launching one execution per event would melt the send pipeline,
//! so events are collected per `(workflow, workspace)` key: the first event
//! for a key arms a flush timer, every same-key event inside the window
//! merges into the batch, and the flush launches one execution carrying
//! `subjectIds` and `subjectPayloads`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use flowline_types::event::EngineEvent;
use flowline_types::workflow::{NodeType, TriggerEvent};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::context::ExecutionContext;
use super::orchestrator::ExecutionLauncher;
use crate::event::EventBus;

/// Default debounce window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Default cap on distinct subjects per batch.
pub const DEFAULT_MAX_SUBJECTS: usize = 500;

struct PendingBatch {
    trigger_type: NodeType,
    depth: u8,
    subject_ids: Vec<String>,
    payloads: Map<String, Value>,
}

/// Debounced per-workflow batch collector.
pub struct BatchCoalescer {
    window: Duration,
    max_subjects: usize,
    launcher: Arc<dyn ExecutionLauncher>,
    bus: EventBus,
    pending: DashMap<(Uuid, Uuid), PendingBatch>,
}

impl BatchCoalescer {
    pub fn new(launcher: Arc<dyn ExecutionLauncher>, bus: EventBus) -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_subjects: DEFAULT_MAX_SUBJECTS,
            launcher,
            bus,
            pending: DashMap::new(),
        }
    }

    /// Override the debounce window (tests use millisecond windows).
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Number of batches currently collecting.
    pub fn pending_batches(&self) -> usize {
        self.pending.len()
    }

    /// Add a trigger event to its workflow's batch, arming the flush timer
    /// on the first event for the key.
    ///
    /// Events without a `contactId` subject cannot be batched and are
    /// dropped with a log line.
    pub async fn enqueue(self: &Arc<Self>, workflow_id: Uuid, event: &TriggerEvent) {
        let Some(subject_id) = event
            .payload
            .get("contactId")
            .map(super::context::value_to_string)
            .filter(|s| !s.is_empty())
        else {
            tracing::debug!(
                %workflow_id,
                trigger_type = ?event.trigger_type,
                "dropping unbatchable trigger event without contactId"
            );
            return;
        };

        let key = (workflow_id, event.workspace_id);
        let mut armed = false;

        {
            let mut batch = self.pending.entry(key).or_insert_with(|| {
                armed = true;
                PendingBatch {
                    trigger_type: event.trigger_type,
                    depth: event.depth,
                    subject_ids: Vec::new(),
                    payloads: Map::new(),
                }
            });

            if !batch.subject_ids.contains(&subject_id) {
                if batch.subject_ids.len() >= self.max_subjects {
                    tracing::warn!(
                        %workflow_id,
                        cap = self.max_subjects,
                        "batch subject cap reached, dropping subject"
                    );
                } else {
                    batch.subject_ids.push(subject_id.clone());
                    batch.payloads.insert(subject_id, event.payload.clone());
                }
            }
            // Keep the deepest chain depth seen so the guard still applies.
            let depth = batch.depth.max(event.depth);
            batch.depth = depth;
        }

        if armed {
            let coalescer = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(coalescer.window).await;
                coalescer.flush(key).await;
            });
        }
    }

    /// Flush one batch immediately. Used by the timer task and by tests.
    pub async fn flush(self: &Arc<Self>, key: (Uuid, Uuid)) {
        let Some((_, batch)) = self.pending.remove(&key) else {
            return;
        };
        let (workflow_id, workspace_id) = key;

        if batch.subject_ids.is_empty() || workflow_id.is_nil() || workspace_id.is_nil() {
            tracing::debug!(%workflow_id, %workspace_id, "discarding empty or unroutable batch");
            return;
        }

        let subjects = batch.subject_ids.len();
        let initial = ExecutionContext::for_trigger(
            workspace_id,
            batch.trigger_type,
            batch.depth,
            Utc::now(),
            json!({"batch": true}),
        )
        .with("subjectIds", Value::Array(batch.subject_ids.into_iter().map(Value::String).collect()))
        .with("subjectPayloads", Value::Object(batch.payloads))
        .to_value();

        self.bus.publish(EngineEvent::BatchFlushed {
            workflow_id,
            workspace_id,
            subjects,
        });
        tracing::info!(%workflow_id, %workspace_id, subjects, "flushing coalesced batch");

        self.launcher.launch(workflow_id, initial).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
