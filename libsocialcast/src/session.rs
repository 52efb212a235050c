//! Live platform sessions, one per account
//!
//! The [`SessionRegistry`] owns every live connection in the process, keyed
//! by account id. Sessions are created lazily on first use, shared by every
//! campaign and post on that account, and evicted when the platform reports
//! a disconnect.
//!
//! A [`Session`] serializes its own sends: two dispatch tasks that hit the
//! same account at the same time queue at the session, never on the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::analytics::AnalyticsRecorder;
use crate::chatbot::match_rule;
use crate::clock::Clock;
use crate::db::Database;
use crate::error::{PlatformError, Result, SocialcastError};
use crate::platforms::{
    ClientMap, Connection, IncomingMessage, MediaFile, SessionEvent, SessionEventReceiver,
};
use crate::service::events::{Event, EventBus};
use crate::types::{AccountStatus, EventType, PlatformAccount, PlatformKind};

/// A live connection bound to one platform account
pub struct Session {
    account_id: String,
    user_id: String,
    platform: PlatformKind,
    generation: u64,
    connection: Box<dyn Connection>,
    send_lock: Mutex<()>,
    db: Database,
    clock: Arc<dyn Clock>,
}

impl Session {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }

    pub async fn send_text(&self, target: &str, text: &str) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        self.connection.send_text(target, text).await?;
        self.touch().await;
        Ok(())
    }

    pub async fn send_media(&self, target: &str, media: &MediaFile, caption: &str) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        self.connection.send_media(target, media, caption).await?;
        self.touch().await;
        Ok(())
    }

    pub async fn publish_media(&self, media: &MediaFile, caption: &str) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        self.connection.publish_media(media, caption).await?;
        self.touch().await;
        Ok(())
    }

    async fn touch(&self) {
        if let Err(e) = self.db.touch_account(&self.account_id, self.clock.now()).await {
            tracing::warn!(account_id = %self.account_id, error = %e, "Failed to stamp account activity");
        }
    }

    async fn close(&self) {
        let _guard = self.send_lock.lock().await;
        if let Err(e) = self.connection.disconnect().await {
            tracing::warn!(account_id = %self.account_id, error = %e, "Error closing session");
        }
    }
}

struct SessionEntry {
    session: Arc<Session>,
    listener: JoinHandle<()>,
}

/// Outcome of the startup restoration sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub failed: usize,
}

type GateMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// A caller's hold on the per-account connect gate.
///
/// The map entry is dropped by whichever holder leaves last.
struct ConnectGate<'a> {
    map: &'a GateMap,
    account_id: String,
    gate: Arc<Mutex<()>>,
}

impl<'a> ConnectGate<'a> {
    fn join(map: &'a GateMap, account_id: &str) -> Self {
        let mut gates = map.lock().unwrap_or_else(PoisonError::into_inner);
        let gate = Arc::clone(gates.entry(account_id.to_string()).or_default());
        Self {
            map,
            account_id: account_id.to_string(),
            gate,
        }
    }
}

impl Drop for ConnectGate<'_> {
    fn drop(&mut self) {
        let mut gates = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours
        let last = Arc::strong_count(&self.gate) == 2
            && gates
                .get(&self.account_id)
                .is_some_and(|gate| Arc::ptr_eq(gate, &self.gate));
        if last {
            gates.remove(&self.account_id);
        }
    }
}

struct RegistryInner {
    db: Database,
    clients: ClientMap,
    clock: Arc<dyn Clock>,
    events: EventBus,
    analytics: AnalyticsRecorder,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    connecting: GateMap,
    next_generation: AtomicU64,
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        db: Database,
        clients: ClientMap,
        clock: Arc<dyn Clock>,
        events: EventBus,
        analytics: AnalyticsRecorder,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                db,
                clients,
                clock,
                events,
                analytics,
                sessions: RwLock::new(HashMap::new()),
                connecting: std::sync::Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Return the live session for `account_id`, connecting if needed.
    ///
    /// Concurrent callers for the same account share one connect attempt.
    /// Any failure is reported as [`PlatformError::SessionUnavailable`];
    /// nothing is retried here.
    pub async fn get_session(&self, account_id: &str) -> Result<Arc<Session>> {
        if let Some(entry) = self.inner.sessions.read().await.get(account_id) {
            return Ok(Arc::clone(&entry.session));
        }

        let gate = ConnectGate::join(&self.inner.connecting, account_id);
        let _connecting = gate.gate.lock().await;

        // Someone else may have finished connecting while we waited
        if let Some(entry) = self.inner.sessions.read().await.get(account_id) {
            return Ok(Arc::clone(&entry.session));
        }

        self.connect(account_id).await
    }

    async fn connect(&self, account_id: &str) -> Result<Arc<Session>> {
        let inner = &self.inner;

        let account = inner.db.get_account(account_id).await?.ok_or_else(|| {
            PlatformError::SessionUnavailable(format!("account {} not found", account_id))
        })?;

        let client = inner.clients.get(&account.platform).ok_or_else(|| {
            PlatformError::SessionUnavailable(format!(
                "no client registered for {}",
                account.platform
            ))
        })?;

        tracing::info!(account_id, platform = %account.platform, "Connecting session");

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = match client.connect(&account, tx).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(account_id, error = %e, "Session connect failed");
                if matches!(e, SocialcastError::Platform(PlatformError::Authentication(_))) {
                    inner.db.set_account_status(account_id, AccountStatus::Error).await?;
                }
                return Err(PlatformError::SessionUnavailable(format!(
                    "account {}: {}",
                    account_id, e
                ))
                .into());
            }
        };

        let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session {
            account_id: account.id.clone(),
            user_id: account.user_id.clone(),
            platform: account.platform,
            generation,
            connection,
            send_lock: Mutex::new(()),
            db: inner.db.clone(),
            clock: Arc::clone(&inner.clock),
        });

        inner
            .db
            .set_account_status(account_id, AccountStatus::Connected)
            .await?;
        inner.db.touch_account(account_id, inner.clock.now()).await?;

        // The listener may evict as soon as it runs, so it must find the entry
        let mut sessions = inner.sessions.write().await;
        let listener = tokio::spawn(listen(
            Arc::downgrade(inner),
            Arc::downgrade(&session),
            account,
            rx,
        ));
        sessions.insert(
            account_id.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                listener,
            },
        );
        drop(sessions);

        Ok(session)
    }

    /// Close and evict the session for `account_id`, marking it disconnected.
    ///
    /// Returns whether a live session existed.
    pub async fn disconnect(&self, account_id: &str) -> Result<bool> {
        let entry = self.inner.sessions.write().await.remove(account_id);
        let existed = entry.is_some();

        if let Some(entry) = entry {
            entry.listener.abort();
            entry.session.close().await;
            self.inner.events.emit(Event::SessionDisconnected {
                account_id: account_id.to_string(),
                reason: "disconnect requested".to_string(),
            });
        }

        self.inner
            .db
            .set_account_status(account_id, AccountStatus::Disconnected)
            .await?;
        tracing::info!(account_id, existed, "Session disconnected");
        Ok(existed)
    }

    /// Reconnect every account persisted as connected
    pub async fn restore_connected(&self) -> Result<RestoreSummary> {
        let accounts = self
            .inner
            .db
            .accounts_with_status(AccountStatus::Connected)
            .await?;
        tracing::info!(count = accounts.len(), "Restoring connected accounts");

        let attempts = accounts.iter().map(|account| async move {
            (account.id.as_str(), self.get_session(&account.id).await)
        });

        let mut summary = RestoreSummary::default();
        for (account_id, result) in join_all(attempts).await {
            match result {
                Ok(_) => summary.restored += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(account_id = %account_id, error = %e, "Failed to restore account");
                }
            }
        }
        Ok(summary)
    }

    /// Close every live session without touching persisted status, so the
    /// next start can restore them.
    pub async fn shutdown(&self) {
        let entries: Vec<SessionEntry> = self
            .inner
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        join_all(entries.into_iter().map(|entry| async move {
            entry.listener.abort();
            entry.session.close().await;
        }))
        .await;
    }

    pub async fn is_active(&self, account_id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(account_id)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    #[cfg(test)]
    fn open_gates(&self) -> usize {
        self.inner
            .connecting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Per-session event loop
async fn listen(
    registry: Weak<RegistryInner>,
    session: Weak<Session>,
    account: PlatformAccount,
    mut rx: SessionEventReceiver,
) {
    let account_id = account.id.as_str();

    while let Some(event) = rx.recv().await {
        let Some(inner) = registry.upgrade() else {
            break;
        };

        match event {
            SessionEvent::Qr(code) => {
                tracing::info!(account_id, "Session waiting for QR scan");
                if let Err(e) = inner
                    .db
                    .set_account_status(account_id, AccountStatus::PendingQr)
                    .await
                {
                    tracing::warn!(account_id, error = %e, "Failed to mark account pending_qr");
                }
                inner.events.emit(Event::SessionQr {
                    account_id: account_id.to_string(),
                    code,
                });
            }
            SessionEvent::Ready => {
                tracing::info!(account_id, "Session ready");
                let marked = async {
                    inner
                        .db
                        .set_account_status(account_id, AccountStatus::Connected)
                        .await?;
                    inner.db.touch_account(account_id, inner.clock.now()).await
                }
                .await;
                if let Err(e) = marked {
                    tracing::warn!(account_id, error = %e, "Failed to mark account connected");
                }
                inner.events.emit(Event::SessionReady {
                    account_id: account_id.to_string(),
                });
            }
            SessionEvent::Disconnected(reason) => {
                tracing::warn!(account_id, reason = %reason, "Session disconnected by platform");
                evict_if_current(&inner, &session, account_id).await;
                if let Err(e) = inner
                    .db
                    .set_account_status(account_id, AccountStatus::Disconnected)
                    .await
                {
                    tracing::warn!(account_id, error = %e, "Failed to mark account disconnected");
                }
                inner.events.emit(Event::SessionDisconnected {
                    account_id: account_id.to_string(),
                    reason,
                });
                break;
            }
            SessionEvent::Message(message) => {
                let Some(live) = session.upgrade() else {
                    break;
                };
                auto_reply(&inner, &live, &account, message).await;
            }
        }
    }
}

/// Remove the registry entry only if it still belongs to this session.
///
/// A reconnect may already have replaced it with a newer generation.
async fn evict_if_current(inner: &RegistryInner, session: &Weak<Session>, account_id: &str) {
    let Some(session) = session.upgrade() else {
        return;
    };

    let mut sessions = inner.sessions.write().await;
    let current = sessions
        .get(account_id)
        .is_some_and(|entry| entry.session.generation == session.generation);
    if current {
        // Dropping the handle detaches this task rather than aborting it
        sessions.remove(account_id);
    }
}

async fn auto_reply(
    inner: &RegistryInner,
    session: &Session,
    account: &PlatformAccount,
    message: IncomingMessage,
) {
    let rules = match inner.db.rules_for_account(&account.id, true).await {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!(account_id = %account.id, error = %e, "Failed to load chatbot rules");
            return;
        }
    };

    let Some(rule) = match_rule(&rules, &message.body) else {
        return;
    };

    let metadata = serde_json::json!({
        "account_id": account.id,
        "from": message.from,
        "keyword": rule.keyword,
    });

    match session.send_text(&message.from, &rule.response_text).await {
        Ok(()) => {
            tracing::debug!(account_id = %account.id, keyword = %rule.keyword, "Chatbot replied");
            inner
                .analytics
                .record_quietly(&account.user_id, None, None, EventType::ChatbotReply, Some(metadata))
                .await;
        }
        Err(e) => {
            tracing::warn!(account_id = %account.id, error = %e, "Chatbot reply failed");
            inner
                .analytics
                .record_quietly(&account.user_id, None, None, EventType::MessageFailed, Some(metadata))
                .await;
        }
    }
}
