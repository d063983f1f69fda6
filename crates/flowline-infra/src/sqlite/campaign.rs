//! SQLite campaign repository implementation.
//!
//! Recurring campaigns and the one-shot sends the recurring checker clones
//! from them share the `campaigns` table: recurring rows carry a rule, one
//! shots carry a `scheduled_at` and point back at their parent.

use chrono::{DateTime, Utc};
use flowline_core::repository::campaign::CampaignRepository;
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{RecurrenceRule, RecurringCampaign};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CampaignRepository`.
pub struct SqliteCampaignRepository {
    pool: DatabasePool,
}

impl SqliteCampaignRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct CampaignRow {
    id: String,
    workspace_id: String,
    name: String,
    rule: Option<String>,
    template: String,
    expires_at: Option<String>,
    last_recurred_at: Option<String>,
}

impl CampaignRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            name: row.try_get("name")?,
            rule: row.try_get("rule")?,
            template: row.try_get("template")?,
            expires_at: row.try_get("expires_at")?,
            last_recurred_at: row.try_get("last_recurred_at")?,
        })
    }

    fn into_campaign(self) -> Result<RecurringCampaign, RepositoryError> {
        let rule: RecurrenceRule = match self.rule.as_deref() {
            Some(rule) => serde_json::from_str(rule)
                .map_err(|e| RepositoryError::Query(format!("invalid recurrence rule: {e}")))?,
            None => {
                return Err(RepositoryError::Query(format!(
                    "recurring campaign {} has no rule",
                    self.id
                )));
            }
        };

        let template: serde_json::Value = serde_json::from_str(&self.template)
            .map_err(|e| RepositoryError::Query(format!("invalid template JSON: {e}")))?;

        Ok(RecurringCampaign {
            id: parse_uuid(&self.id)?,
            workspace_id: parse_uuid(&self.workspace_id)?,
            name: self.name,
            rule,
            template,
            expires_at: self.expires_at.as_deref().map(parse_datetime).transpose()?,
            last_recurred_at: self
                .last_recurred_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// CampaignRepository impl
// ---------------------------------------------------------------------------

impl CampaignRepository for SqliteCampaignRepository {
    async fn save_campaign(&self, campaign: &RecurringCampaign) -> Result<(), RepositoryError> {
        let rule_json = serde_json::to_string(&campaign.rule)
            .map_err(|e| RepositoryError::Query(format!("serialize rule: {e}")))?;
        let template_json = serde_json::to_string(&campaign.template)
            .map_err(|e| RepositoryError::Query(format!("serialize template: {e}")))?;

        sqlx::query(
            r#"INSERT INTO campaigns
               (id, workspace_id, name, recurring, rule, template,
                scheduled_at, expires_at, last_recurred_at, parent_id)
               VALUES (?, ?, ?, 1, ?, ?, NULL, ?, ?, NULL)
               ON CONFLICT(id) DO UPDATE SET
                 workspace_id = excluded.workspace_id,
                 name = excluded.name,
                 rule = excluded.rule,
                 template = excluded.template,
                 expires_at = excluded.expires_at,
                 last_recurred_at = excluded.last_recurred_at"#,
        )
        .bind(campaign.id.to_string())
        .bind(campaign.workspace_id.to_string())
        .bind(&campaign.name)
        .bind(&rule_json)
        .bind(&template_json)
        .bind(campaign.expires_at.as_ref().map(format_datetime))
        .bind(campaign.last_recurred_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_recurring(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecurringCampaign>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT id, workspace_id, name, rule, template, expires_at, last_recurred_at
               FROM campaigns
               WHERE recurring = 1 AND (expires_at IS NULL OR expires_at > ?)
               ORDER BY name ASC"#,
        )
        .bind(format_datetime(&now))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut campaigns = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = CampaignRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            campaigns.push(r.into_campaign()?);
        }
        Ok(campaigns)
    }

    async fn create_one_shot(
        &self,
        parent: &RecurringCampaign,
        at: DateTime<Utc>,
    ) -> Result<Uuid, RepositoryError> {
        let one_shot_id = Uuid::now_v7();
        let template_json = serde_json::to_string(&parent.template)
            .map_err(|e| RepositoryError::Query(format!("serialize template: {e}")))?;

        sqlx::query(
            r#"INSERT INTO campaigns
               (id, workspace_id, name, recurring, rule, template,
                scheduled_at, expires_at, last_recurred_at, parent_id)
               VALUES (?, ?, ?, 0, NULL, ?, ?, NULL, NULL, ?)"#,
        )
        .bind(one_shot_id.to_string())
        .bind(parent.workspace_id.to_string())
        .bind(&parent.name)
        .bind(&template_json)
        .bind(format_datetime(&at))
        .bind(parent.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(one_shot_id)
    }

    async fn mark_recurred(
        &self,
        campaign_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE campaigns SET last_recurred_at = ? WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(campaign_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;
    use flowline_types::workflow::Frequency;
    use serde_json::json;
    use sqlx::Row;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn sample_campaign() -> RecurringCampaign {
        RecurringCampaign {
            id: Uuid::now_v7(),
            workspace_id: Uuid::now_v7(),
            name: "weekly digest".to_string(),
            rule: RecurrenceRule {
                frequency: Frequency::Weekly,
                hour: 9,
                minute: 0,
                day_of_week: Some(0),
                day_of_month: None,
            },
            template: json!({"subject": "This week"}),
            expires_at: None,
            last_recurred_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_list_recurring() {
        let repo = SqliteCampaignRepository::new(test_pool().await);
        let campaign = sample_campaign();
        repo.save_campaign(&campaign).await.unwrap();

        let listed = repo.list_recurring(Utc::now()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "weekly digest");
        assert_eq!(listed[0].rule, campaign.rule);
    }

    #[tokio::test]
    async fn test_expired_campaign_not_listed() {
        let repo = SqliteCampaignRepository::new(test_pool().await);
        let mut campaign = sample_campaign();
        campaign.expires_at = Some(Utc::now() - chrono::Duration::days(1));
        repo.save_campaign(&campaign).await.unwrap();

        let listed = repo.list_recurring(Utc::now()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_points_at_parent_and_stays_unlisted() {
        let pool = test_pool().await;
        let repo = SqliteCampaignRepository::new(pool.clone());
        let campaign = sample_campaign();
        repo.save_campaign(&campaign).await.unwrap();

        let at = Utc::now();
        let one_shot_id = repo.create_one_shot(&campaign, at).await.unwrap();

        // The clone is not a recurring campaign.
        let listed = repo.list_recurring(Utc::now()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, campaign.id);

        let row = sqlx::query("SELECT parent_id, scheduled_at, template FROM campaigns WHERE id = ?")
            .bind(one_shot_id.to_string())
            .fetch_one(&pool.reader)
            .await
            .unwrap();
        let parent_id: String = row.try_get("parent_id").unwrap();
        let scheduled_at: Option<String> = row.try_get("scheduled_at").unwrap();
        let template: String = row.try_get("template").unwrap();
        assert_eq!(parent_id, campaign.id.to_string());
        assert!(scheduled_at.is_some());
        assert!(template.contains("This week"));
    }

    #[tokio::test]
    async fn test_mark_recurred_stamps_campaign() {
        let repo = SqliteCampaignRepository::new(test_pool().await);
        let campaign = sample_campaign();
        repo.save_campaign(&campaign).await.unwrap();

        let at = Utc::now();
        repo.mark_recurred(&campaign.id, at).await.unwrap();

        let listed = repo.list_recurring(Utc::now()).await.unwrap();
        let stamped = listed[0].last_recurred_at.unwrap();
        assert!((stamped - at).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn test_mark_recurred_missing_campaign() {
        let repo = SqliteCampaignRepository::new(test_pool().await);
        let err = repo.mark_recurred(&Uuid::now_v7(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
