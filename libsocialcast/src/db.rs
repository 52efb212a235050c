//! SQLite store for Socialcast
//!
//! The store is the single source of truth for campaign and post status.
//! Status changes that guard against duplicate work go through conditional
//! updates (`... WHERE status = ?`) and report whether they matched. A post
//! being published carries a claim that edits, cancels and deletes respect.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DbError, Result};
use crate::types::{
    AccountStatus, AnalyticsEvent, Campaign, CampaignMessage, CampaignSchedule, CampaignStatus,
    ChatbotRule, DelayRange, EventType, PlatformAccount, PlatformKind, PostContent, PostStatus,
    ScheduledPost,
};

/// Seconds a post claim holds before another processor may take it over
pub const POST_CLAIM_LEASE_SECS: i64 = 15 * 60;

/// Claims taken before this instant are stale
fn claim_cutoff(now: i64) -> i64 {
    now - POST_CLAIM_LEASE_SECS
}

/// Filters for listing scheduled posts; `None` means "any"
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub user_id: Option<String>,
    pub platform: Option<PlatformKind>,
    pub status: Option<PostStatus>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn parse_column<T>(table: &'static str, value: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|reason| DbError::Corrupt { table, reason }.into())
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn create_account(&self, account: &PlatformAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_accounts
                (id, user_id, platform, display_name, credentials, status, last_activity_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.display_name)
        .bind(&account.credentials)
        .bind(account.status.as_str())
        .bind(account.last_activity_at)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<PlatformAccount>> {
        let row = sqlx::query("SELECT * FROM platform_accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| account_from_row(&r)).transpose()
    }

    pub async fn list_accounts(&self, user_id: Option<&str>) -> Result<Vec<PlatformAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM platform_accounts
            WHERE (?1 IS NULL OR user_id = ?1)
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(account_from_row).collect()
    }

    pub async fn accounts_with_status(&self, status: AccountStatus) -> Result<Vec<PlatformAccount>> {
        let rows = sqlx::query("SELECT * FROM platform_accounts WHERE status = ? ORDER BY created_at, id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(account_from_row).collect()
    }

    pub async fn set_account_status(&self, account_id: &str, status: AccountStatus) -> Result<()> {
        sqlx::query("UPDATE platform_accounts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Stamp `last_activity_at` after a successful platform operation
    pub async fn touch_account(&self, account_id: &str, now: i64) -> Result<()> {
        sqlx::query("UPDATE platform_accounts SET last_activity_at = ? WHERE id = ?")
            .bind(now)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Campaigns
    // ------------------------------------------------------------------

    pub async fn create_campaign(&self, campaign: &Campaign) -> Result<()> {
        let targets = serde_json::to_string(&campaign.targets).map_err(|e| DbError::Corrupt {
            table: "campaigns",
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO campaigns
                (id, user_id, account_id, name, campaign_type, targets, message_text, media_url,
                 is_scheduled, send_at, delay_min, delay_max, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&campaign.id)
        .bind(&campaign.user_id)
        .bind(&campaign.account_id)
        .bind(&campaign.name)
        .bind(campaign.campaign_type.as_str())
        .bind(targets)
        .bind(&campaign.message.text)
        .bind(&campaign.message.media_url)
        .bind(campaign.schedule.is_scheduled)
        .bind(campaign.schedule.send_at)
        .bind(campaign.delay.min as i64)
        .bind(campaign.delay.max as i64)
        .bind(campaign.status.as_str())
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| campaign_from_row(&r)).transpose()
    }

    pub async fn list_campaigns(
        &self,
        user_id: Option<&str>,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM campaigns
            WHERE (?1 IS NULL OR user_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(campaign_from_row).collect()
    }

    /// Pending, scheduled campaigns whose send time has passed
    pub async fn find_due_campaigns(&self, now: i64) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'pending'
              AND is_scheduled = 1
              AND send_at IS NOT NULL
              AND send_at <= ?
            ORDER BY send_at, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(campaign_from_row).collect()
    }

    /// Current persisted status, re-read at every cancellation point
    pub async fn campaign_status(&self, campaign_id: &str) -> Result<Option<CampaignStatus>> {
        let row = sqlx::query("SELECT status FROM campaigns WHERE id = ?")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        match row {
            Some(r) => {
                let status: String = r.get("status");
                Ok(Some(parse_column("campaigns", &status)?))
            }
            None => Ok(None),
        }
    }

    /// Move a campaign from `from` to `to` only if it is still in `from`.
    ///
    /// Returns `true` when this call performed the transition. Two callers
    /// racing on the same row cannot both see `true`.
    pub async fn transition_campaign(
        &self,
        campaign_id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(now)
        .bind(campaign_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Unconditional status write, used for the failure path
    pub async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
        now: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(campaign_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Replace the target list; only matches while the campaign is pending
    pub async fn update_campaign_targets(
        &self,
        campaign_id: &str,
        targets: &[String],
        now: i64,
    ) -> Result<bool> {
        let targets = serde_json::to_string(targets).map_err(|e| DbError::Corrupt {
            table: "campaigns",
            reason: e.to_string(),
        })?;

        let result = sqlx::query(
            "UPDATE campaigns SET targets = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(targets)
        .bind(now)
        .bind(campaign_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn campaign_status_counts(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<(CampaignStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n FROM campaigns
            WHERE (?1 IS NULL OR user_id = ?1)
            GROUP BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let status: String = r.get("status");
                Ok((parse_column("campaigns", &status)?, r.get::<i64, _>("n")))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Scheduled posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &ScheduledPost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_posts
                (id, user_id, platform, account_id, target_id, post_type, caption, media_path,
                 media_url, scheduled_time, status, posted_at, error_message, retry_count,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(post.platform.as_str())
        .bind(&post.account_id)
        .bind(&post.target_id)
        .bind(post.post_type.as_str())
        .bind(&post.content.caption)
        .bind(&post.content.media_path)
        .bind(&post.content.media_url)
        .bind(post.scheduled_time)
        .bind(post.status.as_str())
        .bind(post.posted_at)
        .bind(&post.error_message)
        .bind(post.retry_count as i64)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query("SELECT * FROM scheduled_posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    pub async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scheduled_posts
            WHERE (?1 IS NULL OR user_id = ?1)
              AND (?2 IS NULL OR platform = ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY scheduled_time, id
            LIMIT ?4
            "#,
        )
        .bind(filter.user_id.as_deref())
        .bind(filter.platform.map(|p| p.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Pending posts that are due and not claimed by a live processor
    pub async fn find_due_posts(&self, now: i64) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scheduled_posts
            WHERE status = 'pending' AND scheduled_time <= ?1
              AND (claimed_at IS NULL OR claimed_at < ?2)
            ORDER BY scheduled_time, id
            "#,
        )
        .bind(now)
        .bind(claim_cutoff(now))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Claim a post for publishing while it is still in `expected` status.
    ///
    /// Exactly one caller wins until the outcome is saved or the claim goes
    /// stale after [`POST_CLAIM_LEASE_SECS`].
    pub async fn claim_post(&self, post_id: &str, expected: PostStatus, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET claimed_at = ?1
            WHERE id = ?2 AND status = ?3 AND (claimed_at IS NULL OR claimed_at < ?4)
            "#,
        )
        .bind(now)
        .bind(post_id)
        .bind(expected.as_str())
        .bind(claim_cutoff(now))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Persist the outcome of a claimed post and release the claim.
    ///
    /// Only matches while the stored status is still `expected`; `false`
    /// means someone changed the post while it was being published.
    pub async fn save_post_outcome(&self, post: &ScheduledPost, expected: PostStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = ?, posted_at = ?, error_message = ?, retry_count = ?, updated_at = ?,
                claimed_at = NULL
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(post.status.as_str())
        .bind(post.posted_at)
        .bind(&post.error_message)
        .bind(post.retry_count as i64)
        .bind(post.updated_at)
        .bind(&post.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Persist caller-editable fields (caption, media, target, schedule).
    ///
    /// Only matches an unclaimed row still in `expected_status` whose media
    /// path is still `expected_media`, so a replaced file has one owner.
    pub async fn update_post_content(
        &self,
        post: &ScheduledPost,
        expected_status: PostStatus,
        expected_media: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET target_id = ?1, caption = ?2, media_path = ?3, media_url = ?4,
                scheduled_time = ?5, status = ?6, updated_at = ?7
            WHERE id = ?8 AND status = ?9 AND media_path IS ?10
              AND (claimed_at IS NULL OR claimed_at < ?11)
            "#,
        )
        .bind(&post.target_id)
        .bind(&post.content.caption)
        .bind(&post.content.media_path)
        .bind(&post.content.media_url)
        .bind(post.scheduled_time)
        .bind(post.status.as_str())
        .bind(post.updated_at)
        .bind(&post.id)
        .bind(expected_status.as_str())
        .bind(expected_media)
        .bind(claim_cutoff(post.updated_at))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move an unclaimed post from `from` to `to`
    pub async fn transition_post(
        &self,
        post_id: &str,
        from: PostStatus,
        to: PostStatus,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status = ?4 AND (claimed_at IS NULL OR claimed_at < ?5)
            "#,
        )
        .bind(to.as_str())
        .bind(now)
        .bind(post_id)
        .bind(from.as_str())
        .bind(claim_cutoff(now))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete an unclaimed post whose media path is still `expected_media`.
    ///
    /// Returns `true` only for the caller whose delete removed the row, so
    /// the file behind it is removed at most once.
    pub async fn delete_post(
        &self,
        post_id: &str,
        expected_media: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM scheduled_posts
            WHERE id = ?1 AND media_path IS ?2 AND (claimed_at IS NULL OR claimed_at < ?3)
            "#,
        )
        .bind(post_id)
        .bind(expected_media)
        .bind(claim_cutoff(now))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn post_status_counts(&self, user_id: Option<&str>) -> Result<Vec<(PostStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n FROM scheduled_posts
            WHERE (?1 IS NULL OR user_id = ?1)
            GROUP BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let status: String = r.get("status");
                Ok((parse_column("scheduled_posts", &status)?, r.get::<i64, _>("n")))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Analytics events (append-only)
    // ------------------------------------------------------------------

    pub async fn insert_event(&self, event: &AnalyticsEvent) -> Result<i64> {
        let metadata = event.metadata.as_ref().map(|m| m.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO analytics_events (user_id, campaign_id, post_id, event_type, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.user_id)
        .bind(&event.campaign_id)
        .bind(&event.post_id)
        .bind(event.event_type.as_str())
        .bind(metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn events_for_campaign(&self, campaign_id: &str) -> Result<Vec<AnalyticsEvent>> {
        let rows = sqlx::query("SELECT * FROM analytics_events WHERE campaign_id = ? ORDER BY id")
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(event_from_row).collect()
    }

    pub async fn events_for_user(
        &self,
        user_id: &str,
        since: Option<i64>,
    ) -> Result<Vec<AnalyticsEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM analytics_events
            WHERE user_id = ?1 AND (?2 IS NULL OR created_at >= ?2)
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(event_from_row).collect()
    }

    pub async fn count_events(&self, user_id: Option<&str>, event_type: EventType) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM analytics_events
            WHERE (?1 IS NULL OR user_id = ?1) AND event_type = ?2
            "#,
        )
        .bind(user_id)
        .bind(event_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("n"))
    }

    // ------------------------------------------------------------------
    // Chatbot rules
    // ------------------------------------------------------------------

    pub async fn create_rule(&self, rule: &ChatbotRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chatbot_rules (id, account_id, keyword, response_text, is_enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.account_id)
        .bind(&rule.keyword)
        .bind(&rule.response_text)
        .bind(rule.is_enabled)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Rules in creation order, which is also their match priority
    pub async fn rules_for_account(
        &self,
        account_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<ChatbotRule>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM chatbot_rules
            WHERE account_id = ?1 AND (?2 = 0 OR is_enabled = 1)
            ORDER BY created_at, rowid
            "#,
        )
        .bind(account_id)
        .bind(enabled_only)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| ChatbotRule {
                id: r.get("id"),
                account_id: r.get("account_id"),
                keyword: r.get("keyword"),
                response_text: r.get("response_text"),
                is_enabled: r.get("is_enabled"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE chatbot_rules SET is_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }
}

fn account_from_row(r: &SqliteRow) -> Result<PlatformAccount> {
    let platform: String = r.get("platform");
    let status: String = r.get("status");

    Ok(PlatformAccount {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: parse_column("platform_accounts", &platform)?,
        display_name: r.get("display_name"),
        credentials: r.get("credentials"),
        status: parse_column("platform_accounts", &status)?,
        last_activity_at: r.get("last_activity_at"),
        created_at: r.get("created_at"),
    })
}

fn campaign_from_row(r: &SqliteRow) -> Result<Campaign> {
    let campaign_type: String = r.get("campaign_type");
    let status: String = r.get("status");
    let targets: String = r.get("targets");
    let targets: Vec<String> = serde_json::from_str(&targets).map_err(|e| DbError::Corrupt {
        table: "campaigns",
        reason: format!("targets: {}", e),
    })?;

    Ok(Campaign {
        id: r.get("id"),
        user_id: r.get("user_id"),
        account_id: r.get("account_id"),
        name: r.get("name"),
        campaign_type: parse_column("campaigns", &campaign_type)?,
        targets,
        message: CampaignMessage {
            text: r.get("message_text"),
            media_url: r.get("media_url"),
        },
        schedule: CampaignSchedule {
            is_scheduled: r.get("is_scheduled"),
            send_at: r.get("send_at"),
        },
        delay: DelayRange {
            min: r.get::<i64, _>("delay_min").max(0) as u64,
            max: r.get::<i64, _>("delay_max").max(0) as u64,
        },
        status: parse_column("campaigns", &status)?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn post_from_row(r: &SqliteRow) -> Result<ScheduledPost> {
    let platform: String = r.get("platform");
    let post_type: String = r.get("post_type");
    let status: String = r.get("status");

    Ok(ScheduledPost {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: parse_column("scheduled_posts", &platform)?,
        account_id: r.get("account_id"),
        target_id: r.get("target_id"),
        post_type: parse_column("scheduled_posts", &post_type)?,
        content: PostContent {
            caption: r.get("caption"),
            media_path: r.get("media_path"),
            media_url: r.get("media_url"),
        },
        scheduled_time: r.get("scheduled_time"),
        status: parse_column("scheduled_posts", &status)?,
        posted_at: r.get("posted_at"),
        error_message: r.get("error_message"),
        retry_count: r.get::<i64, _>("retry_count").max(0) as u32,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn event_from_row(r: &SqliteRow) -> Result<AnalyticsEvent> {
    let event_type: String = r.get("event_type");
    let metadata: Option<String> = r.get("metadata");
    let metadata = metadata
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .map_err(|e| DbError::Corrupt {
            table: "analytics_events",
            reason: format!("metadata: {}", e),
        })?;

    Ok(AnalyticsEvent {
        id: Some(r.get("id")),
        user_id: r.get("user_id"),
        campaign_id: r.get("campaign_id"),
        post_id: r.get("post_id"),
        event_type: parse_column("analytics_events", &event_type)?,
        metadata,
        created_at: r.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SocialcastError;
    use crate::types::{CampaignType, NewCampaign, NewScheduledPost, PostType};
    use tempfile::TempDir;

    async fn setup() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (db, temp_dir)
    }

    fn campaign(targets: &[&str], scheduled: bool, send_at: Option<i64>) -> Campaign {
        Campaign::from_new(
            NewCampaign {
                user_id: "user-1".to_string(),
                account_id: "acct-1".to_string(),
                name: "spring sale".to_string(),
                campaign_type: CampaignType::WhatsApp,
                targets: targets.iter().map(|t| t.to_string()).collect(),
                message: CampaignMessage {
                    text: "Hello!".to_string(),
                    media_url: None,
                },
                schedule: CampaignSchedule {
                    is_scheduled: scheduled,
                    send_at,
                },
                delay: Some(DelayRange { min: 1, max: 3 }),
            },
            DelayRange::default(),
            1_000,
        )
    }

    fn post(scheduled_time: i64) -> ScheduledPost {
        ScheduledPost::from_new(
            NewScheduledPost {
                user_id: "user-1".to_string(),
                platform: PlatformKind::Telegram,
                account_id: "acct-1".to_string(),
                target_id: Some("-100123".to_string()),
                post_type: PostType::Image,
                content: PostContent {
                    caption: "caption".to_string(),
                    media_path: Some("uploads/a.jpg".to_string()),
                    media_url: None,
                },
                scheduled_time,
            },
            1_000,
        )
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        let result = Database::new("/tmp/socialcast\0invalid.db").await;
        assert!(matches!(result, Err(SocialcastError::Database(_))));
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("dir").join("test.db");
        Database::new(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_campaign_round_trip() {
        let (db, _dir) = setup().await;
        let original = campaign(&["111", "222"], true, Some(2_000));
        db.create_campaign(&original).await.unwrap();

        let loaded = db.get_campaign(&original.id).await.unwrap().unwrap();
        assert_eq!(loaded.targets, vec!["111", "222"]);
        assert_eq!(loaded.delay, DelayRange { min: 1, max: 3 });
        assert_eq!(loaded.schedule.send_at, Some(2_000));
        assert!(loaded.schedule.is_scheduled);
        assert_eq!(loaded.status, CampaignStatus::Pending);
        assert_eq!(loaded.campaign_type, CampaignType::WhatsApp);
    }

    #[tokio::test]
    async fn test_find_due_campaigns_filters() {
        let (db, _dir) = setup().await;

        let due = campaign(&["1"], true, Some(500));
        let future = campaign(&["1"], true, Some(5_000));
        let unscheduled = campaign(&["1"], false, Some(500));
        let mut running = campaign(&["1"], true, Some(500));
        running.status = CampaignStatus::Running;

        for c in [&due, &future, &unscheduled, &running] {
            db.create_campaign(c).await.unwrap();
        }

        let found = db.find_due_campaigns(1_000).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_transition_campaign_only_from_expected_state() {
        let (db, _dir) = setup().await;
        let c = campaign(&["1"], true, Some(0));
        db.create_campaign(&c).await.unwrap();

        assert!(db
            .transition_campaign(&c.id, CampaignStatus::Pending, CampaignStatus::Running, 1)
            .await
            .unwrap());
        assert!(!db
            .transition_campaign(&c.id, CampaignStatus::Pending, CampaignStatus::Running, 2)
            .await
            .unwrap());
        assert_eq!(
            db.campaign_status(&c.id).await.unwrap(),
            Some(CampaignStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let (db, _dir) = setup().await;
        let c = campaign(&["1"], true, Some(0));
        db.create_campaign(&c).await.unwrap();

        let mut handles = vec![];
        for i in 0..8 {
            let db = db.clone();
            let id = c.id.clone();
            handles.push(tokio::spawn(async move {
                db.transition_campaign(&id, CampaignStatus::Pending, CampaignStatus::Running, i)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_targets_frozen_after_pending() {
        let (db, _dir) = setup().await;
        let c = campaign(&["1"], false, None);
        db.create_campaign(&c).await.unwrap();

        let new_targets = vec!["9".to_string(), "8".to_string()];
        assert!(db.update_campaign_targets(&c.id, &new_targets, 5).await.unwrap());

        db.update_campaign_status(&c.id, CampaignStatus::Running, 6)
            .await
            .unwrap();
        assert!(!db
            .update_campaign_targets(&c.id, &["7".to_string()], 7)
            .await
            .unwrap());

        let loaded = db.get_campaign(&c.id).await.unwrap().unwrap();
        assert_eq!(loaded.targets, new_targets);
    }

    #[tokio::test]
    async fn test_delay_check_constraint() {
        let (db, _dir) = setup().await;
        let mut c = campaign(&["1"], false, None);
        c.delay = DelayRange { min: 10, max: 1 };
        assert!(db.create_campaign(&c).await.is_err());
    }

    #[tokio::test]
    async fn test_post_outcome_persisted() {
        let (db, _dir) = setup().await;
        let mut p = post(900);
        db.create_post(&p).await.unwrap();

        assert!(db.claim_post(&p.id, PostStatus::Pending, 1_050).await.unwrap());
        p.mark_failed("Send failed: timeout".to_string(), 1_100);
        assert!(db.save_post_outcome(&p, PostStatus::Pending).await.unwrap());

        let loaded = db.get_post(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Failed);
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.error_message.as_deref(), Some("Send failed: timeout"));
        assert_eq!(loaded.content.media_path.as_deref(), Some("uploads/a.jpg"));
    }

    #[tokio::test]
    async fn test_find_due_posts() {
        let (db, _dir) = setup().await;
        let due = post(900);
        let later = post(2_000);
        let mut posted = post(100);
        posted.mark_posted(200);

        for p in [&due, &later, &posted] {
            db.create_post(p).await.unwrap();
        }

        let found = db.find_due_posts(1_000).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_list_posts_filters_and_orders() {
        let (db, _dir) = setup().await;
        let late = post(3_000);
        let early = post(1_000);
        let mut cancelled = post(2_000);
        cancelled.status = PostStatus::Cancelled;
        for p in [&late, &early, &cancelled] {
            db.create_post(p).await.unwrap();
        }

        let all = db.list_posts(&PostFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), cancelled.id.as_str(), late.id.as_str()]);

        let pending = db
            .list_posts(&PostFilter {
                status: Some(PostStatus::Pending),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, early.id);
    }

    #[tokio::test]
    async fn test_post_claim_is_exclusive_until_saved() {
        let (db, _dir) = setup().await;
        let mut p = post(900);
        db.create_post(&p).await.unwrap();

        assert!(db.claim_post(&p.id, PostStatus::Pending, 1_000).await.unwrap());
        assert!(!db.claim_post(&p.id, PostStatus::Pending, 1_001).await.unwrap());
        assert!(db.find_due_posts(1_001).await.unwrap().is_empty());

        p.mark_posted(1_002);
        assert!(db.save_post_outcome(&p, PostStatus::Pending).await.unwrap());
        assert!(!db.claim_post(&p.id, PostStatus::Pending, 1_003).await.unwrap());
        assert!(db.claim_post(&p.id, PostStatus::Posted, 1_003).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_claim_can_be_taken_over() {
        let (db, _dir) = setup().await;
        let p = post(900);
        db.create_post(&p).await.unwrap();

        assert!(db.claim_post(&p.id, PostStatus::Pending, 1_000).await.unwrap());
        let later = 1_000 + POST_CLAIM_LEASE_SECS + 1;
        assert_eq!(db.find_due_posts(later).await.unwrap().len(), 1);
        assert!(db.claim_post(&p.id, PostStatus::Pending, later).await.unwrap());
    }

    #[tokio::test]
    async fn test_outcome_not_saved_over_changed_status() {
        let (db, _dir) = setup().await;
        let mut p = post(900);
        db.create_post(&p).await.unwrap();
        assert!(db
            .transition_post(&p.id, PostStatus::Pending, PostStatus::Cancelled, 1_000)
            .await
            .unwrap());

        p.mark_posted(1_100);
        assert!(!db.save_post_outcome(&p, PostStatus::Pending).await.unwrap());

        let loaded = db.get_post(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Cancelled);
        assert!(loaded.posted_at.is_none());
    }

    #[tokio::test]
    async fn test_claimed_post_refuses_edits() {
        let (db, _dir) = setup().await;
        let p = post(900);
        db.create_post(&p).await.unwrap();
        assert!(db.claim_post(&p.id, PostStatus::Pending, 1_000).await.unwrap());

        let mut edited = p.clone();
        edited.content.media_path = Some("uploads/b.jpg".to_string());
        edited.updated_at = 1_010;
        let media = Some("uploads/a.jpg");

        assert!(!db
            .update_post_content(&edited, PostStatus::Pending, media)
            .await
            .unwrap());
        assert!(!db
            .transition_post(&p.id, PostStatus::Pending, PostStatus::Cancelled, 1_010)
            .await
            .unwrap());
        assert!(!db.delete_post(&p.id, media, 1_010).await.unwrap());

        let loaded = db.get_post(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Pending);
        assert_eq!(loaded.content.media_path.as_deref(), Some("uploads/a.jpg"));
    }

    #[tokio::test]
    async fn test_media_replacement_has_one_winner() {
        let (db, _dir) = setup().await;
        let p = post(900);
        db.create_post(&p).await.unwrap();

        let mut first = p.clone();
        first.content.media_path = Some("uploads/b.jpg".to_string());
        let mut second = p.clone();
        second.content.media_path = Some("uploads/c.jpg".to_string());
        let old = Some("uploads/a.jpg");

        assert!(db.update_post_content(&first, PostStatus::Pending, old).await.unwrap());
        assert!(!db.update_post_content(&second, PostStatus::Pending, old).await.unwrap());
        assert!(!db.delete_post(&p.id, old, 1_000).await.unwrap());
        assert!(db.delete_post(&p.id, Some("uploads/b.jpg"), 1_000).await.unwrap());
        assert!(db.get_post(&p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_status_counts() {
        let (db, _dir) = setup().await;
        db.create_post(&post(1)).await.unwrap();
        db.create_post(&post(2)).await.unwrap();
        let mut failed = post(3);
        failed.mark_failed("x".to_string(), 4);
        db.create_post(&failed).await.unwrap();

        let mut counts = db.post_status_counts(Some("user-1")).await.unwrap();
        counts.sort_by_key(|(s, _)| s.as_str());
        assert_eq!(counts, vec![(PostStatus::Failed, 1), (PostStatus::Pending, 2)]);
    }

    #[tokio::test]
    async fn test_accounts_by_status_and_touch() {
        let (db, _dir) = setup().await;
        let mut connected = PlatformAccount::new(
            "user-1".to_string(),
            PlatformKind::WhatsApp,
            "+15550001".to_string(),
            None,
            10,
        );
        connected.status = AccountStatus::Connected;
        let idle = PlatformAccount::new(
            "user-1".to_string(),
            PlatformKind::Telegram,
            "@bot".to_string(),
            None,
            11,
        );
        db.create_account(&connected).await.unwrap();
        db.create_account(&idle).await.unwrap();

        let found = db.accounts_with_status(AccountStatus::Connected).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, connected.id);

        db.touch_account(&idle.id, 99).await.unwrap();
        db.set_account_status(&idle.id, AccountStatus::Expired).await.unwrap();
        let loaded = db.get_account(&idle.id).await.unwrap().unwrap();
        assert_eq!(loaded.last_activity_at, Some(99));
        assert_eq!(loaded.status, AccountStatus::Expired);
    }

    #[tokio::test]
    async fn test_events_append_and_query() {
        let (db, _dir) = setup().await;
        for (campaign, kind) in [
            (Some("c1"), EventType::CampaignSent),
            (Some("c1"), EventType::MessageFailed),
            (None, EventType::ChatbotReply),
        ] {
            db.insert_event(&AnalyticsEvent {
                id: None,
                user_id: "user-1".to_string(),
                campaign_id: campaign.map(str::to_string),
                post_id: None,
                event_type: kind,
                metadata: Some(serde_json::json!({ "target": "111" })),
                created_at: 5,
            })
            .await
            .unwrap();
        }

        let events = db.events_for_campaign("c1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::CampaignSent);
        assert_eq!(events[0].metadata.as_ref().unwrap()["target"], "111");

        assert_eq!(db.events_for_user("user-1", None).await.unwrap().len(), 3);
        assert!(db.events_for_user("user-1", Some(6)).await.unwrap().is_empty());
        assert_eq!(
            db.count_events(Some("user-1"), EventType::ChatbotReply).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_rules_enabled_filter() {
        let (db, _dir) = setup().await;
        let first = ChatbotRule::new("acct-1".to_string(), "price", "10 USD".to_string(), 1);
        let second = ChatbotRule::new("acct-1".to_string(), "hours", "9-5".to_string(), 2);
        db.create_rule(&first).await.unwrap();
        db.create_rule(&second).await.unwrap();

        assert!(db.set_rule_enabled(&first.id, false).await.unwrap());

        let enabled = db.rules_for_account("acct-1", true).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].keyword, "hours");

        let all = db.rules_for_account("acct-1", false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
    }

    #[tokio::test]
    async fn test_corrupt_status_is_reported() {
        let (db, _dir) = setup().await;
        sqlx::query(
            "INSERT INTO platform_accounts (id, user_id, platform, display_name, status, created_at)
             VALUES ('x', 'u', 'myspace', 'n', 'connected', 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.get_account("x").await.unwrap_err();
        assert!(matches!(
            err,
            SocialcastError::Database(DbError::Corrupt { table: "platform_accounts", .. })
        ));
    }
}
