//! Append-only record of dispatch outcomes, plus the reports built on it

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::{Result, SocialcastError};
use crate::types::{AnalyticsEvent, CampaignStatus, EventType};

const RECENT_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

/// Per-campaign outcome summary
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub campaign_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub target_count: usize,
    pub sent: usize,
    pub failed: usize,
    pub events: Vec<AnalyticsEvent>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CampaignCounts {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub paused: i64,
    /// Completed over total, in percent, two decimals
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub campaigns: CampaignCounts,
    /// `campaign_sent` plus `message_delivered` events
    pub messages_sent: i64,
    pub chatbot_replies: i64,
    /// Event counts per UTC day over the last seven days
    pub recent_activity: BTreeMap<String, i64>,
}

#[derive(Clone)]
pub struct AnalyticsRecorder {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl AnalyticsRecorder {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn record(
        &self,
        user_id: &str,
        campaign_id: Option<&str>,
        post_id: Option<&str>,
        event_type: EventType,
        metadata: Option<serde_json::Value>,
    ) -> Result<i64> {
        let event = AnalyticsEvent {
            id: None,
            user_id: user_id.to_string(),
            campaign_id: campaign_id.map(str::to_string),
            post_id: post_id.map(str::to_string),
            event_type,
            metadata,
            created_at: self.clock.now(),
        };
        self.db.insert_event(&event).await
    }

    /// Like [`record`](Self::record) but only logs a failure.
    ///
    /// Used on dispatch paths where losing an analytics row must not change
    /// the outcome of the send itself.
    pub async fn record_quietly(
        &self,
        user_id: &str,
        campaign_id: Option<&str>,
        post_id: Option<&str>,
        event_type: EventType,
        metadata: Option<serde_json::Value>,
    ) {
        if let Err(e) = self
            .record(user_id, campaign_id, post_id, event_type, metadata)
            .await
        {
            tracing::warn!(error = %e, event = %event_type, "Failed to record analytics event");
        }
    }

    pub async fn campaign_report(&self, campaign_id: &str) -> Result<CampaignReport> {
        let campaign = self
            .db
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("campaign {}", campaign_id)))?;

        let events = self.db.events_for_campaign(campaign_id).await?;
        let sent = events
            .iter()
            .filter(|e| e.event_type == EventType::CampaignSent)
            .count();
        let failed = events
            .iter()
            .filter(|e| e.event_type == EventType::CampaignFailed)
            .count();

        Ok(CampaignReport {
            campaign_id: campaign.id,
            name: campaign.name,
            status: campaign.status,
            target_count: campaign.targets.len(),
            sent,
            failed,
            events,
        })
    }

    pub async fn dashboard(&self, user_id: &str) -> Result<Dashboard> {
        let mut campaigns = CampaignCounts::default();
        for (status, n) in self.db.campaign_status_counts(Some(user_id)).await? {
            campaigns.total += n;
            match status {
                CampaignStatus::Pending => campaigns.pending = n,
                CampaignStatus::Running => campaigns.running = n,
                CampaignStatus::Completed => campaigns.completed = n,
                CampaignStatus::Failed => campaigns.failed = n,
                CampaignStatus::Paused => campaigns.paused = n,
            }
        }
        if campaigns.total > 0 {
            let rate = campaigns.completed as f64 / campaigns.total as f64 * 100.0;
            campaigns.success_rate = (rate * 100.0).round() / 100.0;
        }

        let messages_sent = self
            .db
            .count_events(Some(user_id), EventType::CampaignSent)
            .await?
            + self
                .db
                .count_events(Some(user_id), EventType::MessageDelivered)
                .await?;
        let chatbot_replies = self
            .db
            .count_events(Some(user_id), EventType::ChatbotReply)
            .await?;

        let since = self.clock.now() - RECENT_WINDOW_SECS;
        let mut recent_activity = BTreeMap::new();
        for event in self.db.events_for_user(user_id, Some(since)).await? {
            if let Some(ts) = chrono::DateTime::from_timestamp(event.created_at, 0) {
                *recent_activity
                    .entry(ts.format("%Y-%m-%d").to_string())
                    .or_insert(0) += 1;
            }
        }

        Ok(Dashboard {
            campaigns,
            messages_sent,
            chatbot_replies,
            recent_activity,
        })
    }
}
