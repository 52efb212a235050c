//! Platform client boundary
//!
//! A [`PlatformClient`] knows how to turn a stored [`PlatformAccount`] into a
//! live [`Connection`]. The dispatch core never talks to a platform any other
//! way; everything platform-specific (login handshakes, upload formats, API
//! quirks) lives behind these two traits.
//!
//! While a connection is alive the client reports lifecycle changes and
//! inbound messages through the [`SessionEventSender`] it was given at
//! connect time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::{PlatformAccount, PlatformKind};

pub mod telegram;
pub mod whatsapp;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Sender address in the platform's own format
    pub from: String,
    pub body: String,
}

/// Lifecycle and inbound traffic reported by a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Login needs a QR scan; carries the code to render
    Qr(String),
    Ready,
    Disconnected(String),
    Message(IncomingMessage),
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// A resolved local media file ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

impl MediaFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    }
}

/// Factory for live connections on one platform
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Establish a connection for `account`.
    ///
    /// May suspend for the whole login handshake. Invalid or expired
    /// session material is an error, never a half-open connection.
    async fn connect(
        &self,
        account: &PlatformAccount,
        events: SessionEventSender,
    ) -> Result<Box<dyn Connection>>;
}

/// One logical connection to a platform account.
///
/// Implementations do not need to serialize their own sends; the session
/// registry guarantees at most one call in flight per connection.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send_text(&self, target: &str, text: &str) -> Result<()>;

    /// Send a photo or video to a chat
    async fn send_media(&self, _target: &str, _media: &MediaFile, _caption: &str) -> Result<()> {
        Err(PlatformError::NotImplemented("media messages on this platform".to_string()).into())
    }

    /// Publish media to the account's own feed
    async fn publish_media(&self, _media: &MediaFile, _caption: &str) -> Result<()> {
        Err(PlatformError::NotImplemented("feed publishing on this platform".to_string()).into())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

pub type ClientMap = HashMap<PlatformKind, Arc<dyn PlatformClient>>;

/// Build the clients enabled in `config`
pub fn build_clients(config: &Config) -> Result<ClientMap> {
    let mut clients: ClientMap = HashMap::new();

    if let Some(telegram) = config.telegram.as_ref().filter(|c| c.enabled) {
        let client = telegram::TelegramClient::new(&telegram.api_base)?;
        clients.insert(PlatformKind::Telegram, Arc::new(client));
    }

    if let Some(whatsapp) = config.whatsapp.as_ref().filter(|c| c.enabled) {
        let client = whatsapp::WhatsAppCloudClient::new(&whatsapp.api_base)?;
        clients.insert(PlatformKind::WhatsApp, Arc::new(client));
    }

    tracing::debug!(count = clients.len(), "Built platform clients");
    Ok(clients)
}

/// Build the shared HTTP client used by the REST-based platforms
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .user_agent(concat!("socialcast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Map an HTTP status from a platform API to the error taxonomy
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> PlatformError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(detail),
        429 => PlatformError::RateLimit(detail),
        400 | 404 | 413 | 422 => PlatformError::Send(detail),
        _ if status.is_server_error() => PlatformError::Network(detail),
        _ => PlatformError::Send(detail),
    }
}
