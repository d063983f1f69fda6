//! Recurring-campaign checker.
//!
//! Hourly sweep over non-expired campaigns with a recurrence rule. A due
//! campaign (rule matches the current hour, has not already recurred today)
//! is cloned into a one-shot send, the parent is stamped, and the clone is
//! handed to the send pipeline. Deliberately a separate type from the
//! schedule checker (different source table, coarser window); only the
//! rule-matching primitive is shared.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::schedule::{rule_matches, Granularity};
use crate::repository::campaign::CampaignRepository;

/// Sweep cadence.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Hands materialized one-shot sends to the delivery machinery.
pub trait SendPipeline: Send + Sync {
    fn dispatch(&self, one_shot_id: Uuid, workspace_id: Uuid) -> BoxFuture<'_, ()>;
}

/// Hourly sweep over recurring campaigns.
pub struct RecurringChecker<C: CampaignRepository> {
    repo: C,
    pipeline: Arc<dyn SendPipeline>,
}

impl<C: CampaignRepository> RecurringChecker<C> {
    pub fn new(repo: C, pipeline: Arc<dyn SendPipeline>) -> Self {
        Self { repo, pipeline }
    }

    /// One sweep. Returns the number of campaigns materialized.
    ///
    /// Failures are logged per campaign; one bad campaign never blocks the
    /// rest of the sweep.
    pub async fn check_once(&self, now: DateTime<Utc>) -> usize {
        let campaigns = match self.repo.list_recurring(now).await {
            Ok(campaigns) => campaigns,
            Err(e) => {
                tracing::error!(error = %e, "failed to list recurring campaigns");
                return 0;
            }
        };

        let mut materialized = 0;
        for campaign in campaigns {
            if !rule_matches(&campaign.rule, now, Granularity::Hour) {
                continue;
            }
            if recurred_today(campaign.last_recurred_at, now) {
                tracing::debug!(campaign_id = %campaign.id, "campaign already recurred today");
                continue;
            }

            let one_shot_id = match self.repo.create_one_shot(&campaign, now).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(campaign_id = %campaign.id, error = %e, "failed to materialize one-shot");
                    continue;
                }
            };
            if let Err(e) = self.repo.mark_recurred(&campaign.id, now).await {
                tracing::error!(campaign_id = %campaign.id, error = %e, "failed to stamp campaign");
                continue;
            }

            tracing::info!(
                campaign_id = %campaign.id,
                %one_shot_id,
                "recurring campaign materialized"
            );
            self.pipeline.dispatch(one_shot_id, campaign.workspace_id).await;
            materialized += 1;
        }
        materialized
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
                    tracing::info!("recurring checker shutting down");
                    return;
                }
            }
        }
    }
}

/// Whether the campaign already recurred on `now`'s UTC date.
fn recurred_today(last_recurred_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_recurred_at.is_some_and(|last| last.date_naive() == now.date_naive())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
