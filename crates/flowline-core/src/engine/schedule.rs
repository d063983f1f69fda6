//! Schedule checker: fires schedule trigger nodes whose recurrence rule
//! matches the current UTC minute.
//!
//! `rule_matches` is the single rule-matching primitive, shared with the
//! recurring-campaign checker at hour granularity. The checker sweeps every
//! 60 seconds; a seen-recently guard keyed on workflow and minute fires
//! each matching workflow at most once per minute, whether the duplicate
//! match comes from an overlapping sweep or a second schedule node on the
//! same workflow.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use flowline_types::workflow::{Frequency, NodeType, RecurrenceRule};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::context::ExecutionContext;
use super::orchestrator::ExecutionLauncher;
use super::seen::SeenCache;
use crate::repository::workflow::WorkflowRepository;

/// Sweep cadence.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// How precisely a rule's time fields are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Hour and minute must both match (schedule trigger nodes).
    Minute,
    /// Only the hour must match (recurring campaigns).
    Hour,
}

/// Whether a recurrence rule fires at `now` (UTC).
///
/// Daily rules match on time alone. Weekly rules additionally match
/// `day_of_week` (0 = Monday), monthly rules `day_of_month` with past-end
/// days clamped to the month's last day. A weekly or monthly rule without
/// its day field set degrades to daily.
pub fn rule_matches(rule: &RecurrenceRule, now: DateTime<Utc>, granularity: Granularity) -> bool {
    if now.hour() != rule.hour {
        return false;
    }
    if granularity == Granularity::Minute && now.minute() != rule.minute {
        return false;
    }

    match rule.frequency {
        Frequency::Daily => true,
        Frequency::Weekly => rule
            .day_of_week
            .is_none_or(|dow| now.weekday().num_days_from_monday() == dow),
        Frequency::Monthly => rule
            .effective_day_of_month(now)
            .is_none_or(|dom| now.day() == dom),
    }
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// Minute-cadence sweep over schedule trigger nodes of active workflows.
pub struct ScheduleChecker<R: WorkflowRepository> {
    repo: R,
    launcher: Arc<dyn ExecutionLauncher>,
    seen: SeenCache,
}

impl<R: WorkflowRepository> ScheduleChecker<R> {
    pub fn new(repo: R, launcher: Arc<dyn ExecutionLauncher>) -> Self {
        Self {
            repo,
            launcher,
            // Entries only need to survive one matching minute.
            seen: SeenCache::new(Duration::from_secs(120), 4096),
        }
    }

    /// One sweep. Returns the number of workflows fired.
    ///
    /// A malformed rule or failed launch is logged and skips only its own
    /// workflow, never the sweep.
    pub async fn check_once(&self, now: DateTime<Utc>) -> usize {
        let bindings = match self.repo.list_schedule_nodes().await {
            Ok(bindings) => bindings,
            Err(e) => {
                tracing::error!(error = %e, "failed to list schedule nodes");
                return 0;
            }
        };

        let mut fired = 0;
        for binding in bindings {
            let rule: RecurrenceRule = match binding
                .node
                .data
                .get("schedule")
                .cloned()
                .map(serde_json::from_value)
            {
                Some(Ok(rule)) => rule,
                Some(Err(e)) => {
                    tracing::warn!(
                        workflow_id = %binding.node.workflow_id,
                        node_id = %binding.node.id,
                        error = %e,
                        "skipping schedule node with malformed rule"
                    );
                    continue;
                }
                None => {
                    tracing::warn!(
                        workflow_id = %binding.node.workflow_id,
                        node_id = %binding.node.id,
                        "skipping schedule node without a rule"
                    );
                    continue;
                }
            };

            if !rule_matches(&rule, now, Granularity::Minute) {
                continue;
            }

            // Per workflow, not per node: a workflow with several schedule
            // nodes matching the same minute still launches once.
            let guard_key = format!(
                "{}:{}",
                binding.node.workflow_id,
                now.format("%Y%m%d%H%M")
            );
            if self.seen.seen_recently(&guard_key) {
                continue;
            }
            self.seen.mark_seen(&guard_key);

            tracing::info!(
                workflow_id = %binding.node.workflow_id,
                node_id = %binding.node.id,
                "schedule rule matched, launching"
            );

            let initial = ExecutionContext::for_trigger(
                binding.workspace_id,
                NodeType::Schedule,
                0,
                now,
                json!({"scheduledFor": now}),
            )
            .to_value();
            self.fire(binding.node.workflow_id, initial).await;
            fired += 1;
        }
        fired
    }

    async fn fire(&self, workflow_id: Uuid, initial: serde_json::Value) {
        self.launcher.launch(workflow_id, initial).await;
    }

    /// Run the sweep loop until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_once(Utc::now()).await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("schedule checker shutting down");
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
