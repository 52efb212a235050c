//! Campaign management
//!
//! Creating an unscheduled campaign launches it right away. Scheduled ones
//! wait for the scanner.

use std::sync::Arc;

use crate::analytics::{AnalyticsRecorder, CampaignReport, Dashboard};
use crate::clock::Clock;
use crate::db::Database;
use crate::dispatch::{CampaignDispatcher, DispatchOutcome};
use crate::error::{Result, SocialcastError};
use crate::tasks::TaskTracker;
use crate::types::{Campaign, CampaignStatus, DelayRange, NewCampaign};

#[derive(Clone)]
pub struct CampaignService {
    db: Database,
    dispatcher: CampaignDispatcher,
    tracker: TaskTracker,
    analytics: AnalyticsRecorder,
    clock: Arc<dyn Clock>,
    default_delay: DelayRange,
}

impl CampaignService {
    pub fn new(
        db: Database,
        dispatcher: CampaignDispatcher,
        tracker: TaskTracker,
        analytics: AnalyticsRecorder,
        clock: Arc<dyn Clock>,
        default_delay: DelayRange,
    ) -> Self {
        Self {
            db,
            dispatcher,
            tracker,
            analytics,
            clock,
            default_delay,
        }
    }

    /// Store a new campaign.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty name or target list, an inverted delay
    /// range, or a scheduled campaign without a send time.
    pub async fn create(&self, mut new: NewCampaign) -> Result<Campaign> {
        validate(&new)?;
        new.targets = clean_targets(new.targets);

        let campaign = Campaign::from_new(new, self.default_delay, self.clock.now());
        self.db.create_campaign(&campaign).await?;
        tracing::info!(
            campaign_id = %campaign.id,
            targets = campaign.targets.len(),
            scheduled = campaign.schedule.is_scheduled,
            "Created campaign"
        );

        if !campaign.schedule.is_scheduled {
            self.dispatcher.spawn(&self.tracker, campaign.clone());
        }

        Ok(campaign)
    }

    pub async fn get(&self, campaign_id: &str) -> Result<Campaign> {
        self.db
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("campaign {}", campaign_id)))
    }

    pub async fn list(
        &self,
        user_id: Option<&str>,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>> {
        self.db.list_campaigns(user_id, status).await
    }

    /// Replace the target list of a campaign that has not started
    pub async fn update_targets(&self, campaign_id: &str, targets: Vec<String>) -> Result<()> {
        let targets = clean_targets(targets);
        if targets.is_empty() {
            return Err(SocialcastError::InvalidInput(
                "Campaign needs at least one target".to_string(),
            ));
        }

        if self
            .db
            .update_campaign_targets(campaign_id, &targets, self.clock.now())
            .await?
        {
            return Ok(());
        }

        let campaign = self.get(campaign_id).await?;
        Err(SocialcastError::InvalidInput(format!(
            "Campaign is {}; only pending campaigns can be edited",
            campaign.status
        )))
    }

    /// Dispatch a campaign in the foreground and wait for it
    pub async fn run(&self, campaign_id: &str) -> Result<DispatchOutcome> {
        let campaign = self.get(campaign_id).await?;
        if campaign.status != CampaignStatus::Pending {
            return Err(SocialcastError::InvalidInput(format!(
                "Campaign is {}; only pending campaigns can be run",
                campaign.status
            )));
        }
        self.dispatcher.dispatch(&campaign).await
    }

    /// Stop a running campaign at its next target
    pub async fn pause(&self, campaign_id: &str) -> Result<()> {
        let paused = self
            .db
            .transition_campaign(
                campaign_id,
                CampaignStatus::Running,
                CampaignStatus::Paused,
                self.clock.now(),
            )
            .await?;
        if paused {
            tracing::info!(campaign_id = %campaign_id, "Paused campaign");
            return Ok(());
        }

        let campaign = self.get(campaign_id).await?;
        Err(SocialcastError::InvalidInput(format!(
            "Campaign is {}; only running campaigns can be paused",
            campaign.status
        )))
    }

    pub async fn report(&self, campaign_id: &str) -> Result<CampaignReport> {
        self.analytics.campaign_report(campaign_id).await
    }

    pub async fn dashboard(&self, user_id: &str) -> Result<Dashboard> {
        self.analytics.dashboard(user_id).await
    }
}

fn clean_targets(targets: Vec<String>) -> Vec<String> {
    targets
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn validate(new: &NewCampaign) -> Result<()> {
    if new.name.trim().is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Campaign name cannot be empty".to_string(),
        ));
    }
    if new.targets.iter().all(|t| t.trim().is_empty()) {
        return Err(SocialcastError::InvalidInput(
            "Campaign needs at least one target".to_string(),
        ));
    }
    if let Some(delay) = new.delay {
        DelayRange::new(delay.min, delay.max).map_err(SocialcastError::InvalidInput)?;
    }
    if new.schedule.is_scheduled && new.schedule.send_at.is_none() {
        return Err(SocialcastError::InvalidInput(
            "Scheduled campaigns need a send time".to_string(),
        ));
    }
    Ok(())
}
