//! Progress event bus
//!
//! In-process broadcast of session and dispatch progress. Emitting never
//! blocks: with no subscribers the event is dropped, and a lagging
//! subscriber loses the oldest events rather than stalling a dispatch.
//!
//! ```no_run
//! use libsocialcast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::SessionReady {
//!     account_id: "acct-1".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{CampaignStatus, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before lagging kicks in
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Login for an account is waiting on a QR scan
    SessionQr { account_id: String, code: String },

    SessionReady { account_id: String },

    SessionDisconnected { account_id: String, reason: String },

    CampaignStarted {
        campaign_id: String,
        target_count: usize,
    },

    /// One target handled; `sent` counts successful sends so far
    CampaignProgress {
        campaign_id: String,
        target: String,
        sent: usize,
        total: usize,
    },

    CampaignFinished {
        campaign_id: String,
        status: CampaignStatus,
        sent: usize,
        error: Option<String>,
    },

    PostProcessed {
        post_id: String,
        status: PostStatus,
        error: Option<String>,
    },
}
