//! Campaign dispatch
//!
//! Drives one campaign's targets through its account's session:
//!
//! 1. Claim the campaign with a conditional `pending -> running` update.
//!    A caller that loses the claim does nothing.
//! 2. Campaign types that are not sent through a session are left `running`.
//! 3. Acquire the session. Failure marks the campaign `failed`.
//! 4. For each target in list order: re-read the status and stop unless it
//!    is still `running`, send, record the send, then sleep a random delay
//!    before the next target.
//! 5. Mark `completed`, but only if nobody moved it out of `running`.
//!
//! The first send error aborts the remaining targets and marks the campaign
//! `failed`. Which targets were reached before that is only visible in the
//! analytics log.

use std::sync::Arc;

use serde_json::json;

use crate::analytics::AnalyticsRecorder;
use crate::clock::Clock;
use crate::db::Database;
use crate::delay::{DelayPolicy, Sleeper};
use crate::error::{Result, SocialcastError};
use crate::service::events::{Event, EventBus};
use crate::session::SessionRegistry;
use crate::tasks::TaskTracker;
use crate::types::{Campaign, CampaignStatus, EventType};

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Every target was sent
    Completed { sent: usize },
    /// Status left `running` between targets; `status` is what was observed
    Interrupted {
        sent: usize,
        status: Option<CampaignStatus>,
    },
    Failed { sent: usize, error: String },
    /// Claimed, but the campaign type has no live sender
    Skipped,
    /// Another caller claimed the campaign first
    AlreadyClaimed,
}

enum Progress {
    Exhausted(usize),
    Stopped(usize, Option<CampaignStatus>),
}

#[derive(Clone)]
pub struct CampaignDispatcher {
    db: Database,
    registry: SessionRegistry,
    delay: Arc<DelayPolicy>,
    sleeper: Arc<dyn Sleeper>,
    analytics: AnalyticsRecorder,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl CampaignDispatcher {
    pub fn new(
        db: Database,
        registry: SessionRegistry,
        delay: Arc<DelayPolicy>,
        sleeper: Arc<dyn Sleeper>,
        analytics: AnalyticsRecorder,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            registry,
            delay,
            sleeper,
            analytics,
            events,
            clock,
        }
    }

    /// Run a campaign to completion, failure or interruption.
    ///
    /// Errors returned here are store failures; platform failures end up in
    /// the campaign status and the outcome instead.
    pub async fn dispatch(&self, snapshot: &Campaign) -> Result<DispatchOutcome> {
        let claimed = self
            .db
            .transition_campaign(
                &snapshot.id,
                CampaignStatus::Pending,
                CampaignStatus::Running,
                self.clock.now(),
            )
            .await?;
        if !claimed {
            tracing::debug!(campaign_id = %snapshot.id, "Campaign already claimed");
            return Ok(DispatchOutcome::AlreadyClaimed);
        }

        // Edits land until the claim, so send what is stored now
        let Some(campaign) = self.db.get_campaign(&snapshot.id).await? else {
            tracing::warn!(campaign_id = %snapshot.id, "Campaign deleted after claim");
            return Ok(DispatchOutcome::Interrupted {
                sent: 0,
                status: None,
            });
        };
        let campaign = &campaign;

        tracing::info!(
            campaign_id = %campaign.id,
            name = %campaign.name,
            targets = campaign.targets.len(),
            "Starting campaign"
        );
        self.events.emit(Event::CampaignStarted {
            campaign_id: campaign.id.clone(),
            target_count: campaign.targets.len(),
        });

        if !campaign.campaign_type.requires_session() {
            tracing::info!(
                campaign_id = %campaign.id,
                campaign_type = %campaign.campaign_type,
                "No sender for campaign type, leaving it running"
            );
            return Ok(DispatchOutcome::Skipped);
        }

        let outcome = match self.send_all(campaign).await {
            Ok(Progress::Exhausted(sent)) => {
                let completed = self
                    .db
                    .transition_campaign(
                        &campaign.id,
                        CampaignStatus::Running,
                        CampaignStatus::Completed,
                        self.clock.now(),
                    )
                    .await?;
                if completed {
                    DispatchOutcome::Completed { sent }
                } else {
                    DispatchOutcome::Interrupted {
                        sent,
                        status: self.db.campaign_status(&campaign.id).await?,
                    }
                }
            }
            Ok(Progress::Stopped(sent, status)) => DispatchOutcome::Interrupted { sent, status },
            Err((sent, e)) => {
                self.db
                    .update_campaign_status(&campaign.id, CampaignStatus::Failed, self.clock.now())
                    .await?;
                DispatchOutcome::Failed {
                    sent,
                    error: e.to_string(),
                }
            }
        };

        self.finish(campaign, &outcome);
        Ok(outcome)
    }

    async fn send_all(
        &self,
        campaign: &Campaign,
    ) -> std::result::Result<Progress, (usize, SocialcastError)> {
        let session = self
            .registry
            .get_session(&campaign.account_id)
            .await
            .map_err(|e| (0, e))?;

        let total = campaign.targets.len();
        let mut sent = 0;

        for (index, target) in campaign.targets.iter().enumerate() {
            let status = self
                .db
                .campaign_status(&campaign.id)
                .await
                .map_err(|e| (sent, e))?;
            if status != Some(CampaignStatus::Running) {
                tracing::info!(
                    campaign_id = %campaign.id,
                    status = ?status,
                    sent,
                    "Campaign no longer running, stopping"
                );
                return Ok(Progress::Stopped(sent, status));
            }

            if let Err(e) = session.send_text(target, &campaign.message.text).await {
                tracing::warn!(campaign_id = %campaign.id, target = %target, error = %e, "Send failed");
                self.analytics
                    .record_quietly(
                        &campaign.user_id,
                        Some(&campaign.id),
                        None,
                        EventType::CampaignFailed,
                        Some(json!({ "target": target, "error": e.to_string() })),
                    )
                    .await;
                return Err((sent, e));
            }

            sent += 1;
            tracing::debug!(campaign_id = %campaign.id, target = %target, sent, total, "Sent");
            self.analytics
                .record_quietly(
                    &campaign.user_id,
                    Some(&campaign.id),
                    None,
                    EventType::CampaignSent,
                    Some(json!({ "target": target })),
                )
                .await;
            self.events.emit(Event::CampaignProgress {
                campaign_id: campaign.id.clone(),
                target: target.clone(),
                sent,
                total,
            });

            if index + 1 < total {
                let pause = self.delay.next_delay(campaign.delay);
                tracing::debug!(campaign_id = %campaign.id, secs = pause.as_secs(), "Waiting before next target");
                self.sleeper.sleep(pause).await;
            }
        }

        Ok(Progress::Exhausted(sent))
    }

    fn finish(&self, campaign: &Campaign, outcome: &DispatchOutcome) {
        let (status, sent, error) = match outcome {
            DispatchOutcome::Completed { sent } => (CampaignStatus::Completed, *sent, None),
            DispatchOutcome::Interrupted { sent, status } => {
                (status.unwrap_or(CampaignStatus::Paused), *sent, None)
            }
            DispatchOutcome::Failed { sent, error } => {
                (CampaignStatus::Failed, *sent, Some(error.clone()))
            }
            DispatchOutcome::Skipped | DispatchOutcome::AlreadyClaimed => return,
        };

        match &error {
            Some(error) => {
                tracing::error!(campaign_id = %campaign.id, sent, error = %error, "Campaign failed")
            }
            None => tracing::info!(campaign_id = %campaign.id, status = %status, sent, "Campaign finished"),
        }

        self.events.emit(Event::CampaignFinished {
            campaign_id: campaign.id.clone(),
            status,
            sent,
            error,
        });
    }

    /// Launch a dispatch without waiting for it
    pub fn spawn(&self, tracker: &TaskTracker, campaign: Campaign) {
        let dispatcher = self.clone();
        tracker.spawn(async move {
            if let Err(e) = dispatcher.dispatch(&campaign).await {
                tracing::error!(campaign_id = %campaign.id, error = %e, "Campaign dispatch aborted");
            }
        });
    }
}
