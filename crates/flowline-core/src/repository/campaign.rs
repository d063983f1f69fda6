//! Campaign repository trait definition.
//!
//! Storage interface for recurring campaigns and the one-shot sends the
//! recurring checker materializes from them.

use chrono::{DateTime, Utc};
use flowline_types::error::RepositoryError;
use flowline_types::workflow::RecurringCampaign;
use uuid::Uuid;

/// Repository trait for recurring-campaign persistence.
pub trait CampaignRepository: Send + Sync {
    /// Persist a recurring campaign (insert or replace by ID).
    fn save_campaign(
        &self,
        campaign: &RecurringCampaign,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List campaigns with a recurrence rule that have not expired as of `now`.
    fn list_recurring(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<RecurringCampaign>, RepositoryError>> + Send;

    /// Clone a recurring campaign into a one-shot send scheduled at `at`.
    /// Returns the new one-shot's ID.
    fn create_one_shot(
        &self,
        parent: &RecurringCampaign,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Uuid, RepositoryError>> + Send;

    /// Stamp the parent campaign's `last_recurred_at`.
    fn mark_recurred(
        &self,
        campaign_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
