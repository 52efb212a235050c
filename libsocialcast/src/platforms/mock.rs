//! Mock platform client for testing
//!
//! Records every send, can fail connects or individual targets on demand,
//! can hold each send open for a while to expose overlapping calls, can drop
//! a connection mid-connect, and lets a test push session events into a live
//! connection.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::platforms::{
    Connection, MediaFile, PlatformClient, SessionEvent, SessionEventSender,
};
use crate::types::{PlatformAccount, PlatformKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentKind {
    Text,
    Media,
    Published,
}

/// One call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub account_id: String,
    pub kind: SentKind,
    pub target: Option<String>,
    pub text: String,
    pub media: Option<PathBuf>,
}

#[derive(Default)]
struct MockState {
    sent: Mutex<Vec<SentMessage>>,
    senders: Mutex<HashMap<String, SessionEventSender>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone)]
struct MockBehavior {
    connect_error: Option<PlatformError>,
    failing_targets: HashSet<String>,
    send_error: PlatformError,
    send_delay: Duration,
    connect_delay: Duration,
    qr_code: Option<String>,
    drop_reason: Option<String>,
}

pub struct MockClient {
    kind: PlatformKind,
    behavior: MockBehavior,
    state: Arc<MockState>,
}

impl MockClient {
    /// A client whose connects and sends all succeed
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            behavior: MockBehavior {
                connect_error: None,
                failing_targets: HashSet::new(),
                send_error: PlatformError::Send("mock send failure".to_string()),
                send_delay: Duration::ZERO,
                connect_delay: Duration::ZERO,
                qr_code: None,
                drop_reason: None,
            },
            state: Arc::new(MockState::default()),
        }
    }

    /// Every connect attempt fails with `error`
    pub fn failing_connect(kind: PlatformKind, error: PlatformError) -> Self {
        let mut client = Self::new(kind);
        client.behavior.connect_error = Some(error);
        client
    }

    /// Sends to any of these targets fail with a send error
    pub fn with_failing_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.behavior
            .failing_targets
            .extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn with_send_error(mut self, error: PlatformError) -> Self {
        self.behavior.send_error = error;
        self
    }

    /// Hold every send open for `delay` (real time)
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.behavior.send_delay = delay;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.behavior.connect_delay = delay;
        self
    }

    /// Emit a QR event before `Ready` on every connect
    pub fn with_qr(mut self, code: &str) -> Self {
        self.behavior.qr_code = Some(code.to_string());
        self
    }

    /// Report the connection lost right after `Ready`, before connect returns
    pub fn with_drop_on_connect(mut self, reason: &str) -> Self {
        self.behavior.drop_reason = Some(reason.to_string());
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.state.sent).clone()
    }

    /// Targets of text sends, in call order
    pub fn sent_targets(&self) -> Vec<String> {
        lock(&self.state.sent)
            .iter()
            .filter(|m| m.kind == SentKind::Text)
            .filter_map(|m| m.target.clone())
            .collect()
    }

    pub fn send_count(&self) -> usize {
        lock(&self.state.sent).len()
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Highest number of sends observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Push an event into the live connection for `account_id`.
    ///
    /// Returns `false` when there is no connection or nobody is listening.
    pub fn emit(&self, account_id: &str, event: SessionEvent) -> bool {
        match lock(&self.state.senders).get(account_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    async fn connect(
        &self,
        account: &PlatformAccount,
        events: SessionEventSender,
    ) -> Result<Box<dyn Connection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        if !self.behavior.connect_delay.is_zero() {
            tokio::time::sleep(self.behavior.connect_delay).await;
        }

        if let Some(error) = &self.behavior.connect_error {
            return Err(error.clone().into());
        }

        if let Some(code) = &self.behavior.qr_code {
            let _ = events.send(SessionEvent::Qr(code.clone()));
        }
        let _ = events.send(SessionEvent::Ready);
        if let Some(reason) = &self.behavior.drop_reason {
            let _ = events.send(SessionEvent::Disconnected(reason.clone()));
        }

        lock(&self.state.senders).insert(account.id.clone(), events);

        Ok(Box::new(MockConnection {
            account_id: account.id.clone(),
            behavior: self.behavior.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockConnection {
    account_id: String,
    behavior: MockBehavior,
    state: Arc<MockState>,
}

impl MockConnection {
    async fn record(
        &self,
        kind: SentKind,
        target: Option<&str>,
        text: &str,
        media: Option<&MediaFile>,
    ) -> Result<()> {
        let now_in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight
            .fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.behavior.send_delay.is_zero() {
            tokio::time::sleep(self.behavior.send_delay).await;
        }

        let result: Result<()> = match target {
            Some(t) if self.behavior.failing_targets.contains(t) => {
                Err(self.behavior.send_error.clone().into())
            }
            _ => {
                lock(&self.state.sent).push(SentMessage {
                    account_id: self.account_id.clone(),
                    kind,
                    target: target.map(str::to_string),
                    text: text.to_string(),
                    media: media.map(|m| m.path.clone()),
                });
                Ok(())
            }
        };

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_text(&self, target: &str, text: &str) -> Result<()> {
        self.record(SentKind::Text, Some(target), text, None).await
    }

    async fn send_media(&self, target: &str, media: &MediaFile, caption: &str) -> Result<()> {
        self.record(SentKind::Media, Some(target), caption, Some(media))
            .await
    }

    async fn publish_media(&self, media: &MediaFile, caption: &str) -> Result<()> {
        self.record(SentKind::Published, None, caption, Some(media))
            .await
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.senders).remove(&self.account_id);
        Ok(())
    }
}
