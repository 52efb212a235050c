//! Recurring scanner
//!
//! Two independent timers, one for due campaigns and one for due posts.
//! A tick only launches work on the [`TaskTracker`]; it never waits for a
//! campaign or post to finish. A failing tick is logged and the next one
//! fires as usual.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::db::Database;
use crate::dispatch::CampaignDispatcher;
use crate::error::Result;
use crate::processor::PostProcessor;
use crate::tasks::TaskTracker;

#[derive(Clone)]
pub struct Scanner {
    db: Database,
    dispatcher: CampaignDispatcher,
    processor: PostProcessor,
    tracker: TaskTracker,
    clock: Arc<dyn Clock>,
    campaign_interval: Duration,
    post_interval: Duration,
}

impl Scanner {
    pub fn new(
        db: Database,
        dispatcher: CampaignDispatcher,
        processor: PostProcessor,
        tracker: TaskTracker,
        clock: Arc<dyn Clock>,
        campaign_interval: Duration,
        post_interval: Duration,
    ) -> Self {
        Self {
            db,
            dispatcher,
            processor,
            tracker,
            clock,
            campaign_interval,
            post_interval,
        }
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Launch a dispatch for every due campaign; returns how many were launched
    pub async fn scan_campaigns(&self) -> Result<usize> {
        self.tracker.reap();
        let due = self.db.find_due_campaigns(self.clock.now()).await?;
        let count = due.len();
        for campaign in due {
            self.dispatcher.spawn(&self.tracker, campaign);
        }
        if count > 0 {
            tracing::info!(count, "Launched due campaigns");
        }
        Ok(count)
    }

    /// Launch processing for every due post; returns how many were launched
    pub async fn scan_posts(&self) -> Result<usize> {
        self.tracker.reap();
        let due = self.db.find_due_posts(self.clock.now()).await?;
        let count = due.len();
        for post in due {
            self.processor.spawn(&self.tracker, post);
        }
        if count > 0 {
            tracing::info!(count, "Launched due posts");
        }
        Ok(count)
    }

    /// Tick until `shutdown` flips to true.
    ///
    /// Work already launched keeps running; drain the tracker afterwards.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut campaign_timer = tokio::time::interval(self.campaign_interval);
        let mut post_timer = tokio::time::interval(self.post_interval);
        campaign_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        post_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            campaign_interval_secs = self.campaign_interval.as_secs(),
            post_interval_secs = self.post_interval.as_secs(),
            "Scanner started"
        );

        loop {
            tokio::select! {
                _ = campaign_timer.tick() => {
                    if let Err(e) = self.scan_campaigns().await {
                        tracing::error!(error = %e, "Campaign scan failed");
                    }
                }
                _ = post_timer.tick() => {
                    if let Err(e) = self.scan_posts().await {
                        tracing::error!(error = %e, "Post scan failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(in_flight = self.tracker.len(), "Scanner stopped");
    }
}
