//! Telegram Bot API client
//!
//! Account credentials are a JSON object `{"bot_token": "..."}`. Connecting
//! validates the token with `getMe`; photos and videos are uploaded as
//! multipart form data straight from the resolved local file.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{PlatformError, Result};
use crate::platforms::{
    http_client, status_error, Connection, MediaFile, MediaKind, PlatformClient, SessionEvent,
    SessionEventSender,
};
use crate::types::{PlatformAccount, PlatformKind};

#[derive(Debug, Deserialize)]
struct TelegramCredentials {
    bot_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    id: i64,
    username: Option<String>,
}

fn parse_credentials(account: &PlatformAccount) -> Result<TelegramCredentials> {
    let raw = account.credentials.as_deref().ok_or_else(|| {
        PlatformError::Authentication(format!("account {} has no bot token", account.id))
    })?;

    let creds: TelegramCredentials = serde_json::from_str(raw).map_err(|e| {
        PlatformError::Authentication(format!("unreadable Telegram credentials: {}", e))
    })?;

    if creds.bot_token.trim().is_empty() {
        return Err(PlatformError::Authentication("empty bot token".to_string()).into());
    }
    Ok(creds)
}

pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
}

impl TelegramClient {
    pub fn new(api_base: &str) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Telegram
    }

    async fn connect(
        &self,
        account: &PlatformAccount,
        events: SessionEventSender,
    ) -> Result<Box<dyn Connection>> {
        let creds = parse_credentials(account)?;
        let connection = TelegramConnection {
            http: self.http.clone(),
            bot_url: format!("{}/bot{}", self.api_base, creds.bot_token),
        };

        let me: BotUser = connection.call_get("getMe").await.map_err(|e| match e {
            crate::error::SocialcastError::Platform(PlatformError::Send(msg)) => {
                PlatformError::Authentication(msg).into()
            }
            other => other,
        })?;

        tracing::info!(
            account_id = %account.id,
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or(""),
            "Telegram bot connected"
        );
        let _ = events.send(SessionEvent::Ready);

        Ok(Box::new(connection))
    }
}

pub struct TelegramConnection {
    http: reqwest::Client,
    bot_url: String,
}

impl TelegramConnection {
    async fn read_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        method: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Network(format!("{} response: {}", method, e)))?;

        let parsed: Option<ApiResponse<T>> = serde_json::from_str(&body).ok();

        match parsed {
            Some(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Some(ApiResponse { description, .. }) => {
                let description = description.unwrap_or_else(|| "no description".to_string());
                Err(status_error(status, &format!("{} {}", method, description)).into())
            }
            None if !status.is_success() => Err(status_error(status, &body).into()),
            None => Err(PlatformError::Send(format!("{}: unexpected response: {}", method, body)).into()),
        }
    }

    async fn call_get<T: serde::de::DeserializeOwned>(&self, method: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}/{}", self.bot_url, method))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("{} failed: {}", method, e)))?;

        Self::read_response(response, method).await
    }

    async fn call_json(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/{}", self.bot_url, method))
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("{} failed: {}", method, e)))?;

        Self::read_response::<serde_json::Value>(response, method).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for TelegramConnection {
    async fn send_text(&self, target: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(PlatformError::Validation("Telegram message text is empty".to_string()).into());
        }

        self.call_json(
            "sendMessage",
            serde_json::json!({
                "chat_id": target,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await
    }

    async fn send_media(&self, target: &str, media: &MediaFile, caption: &str) -> Result<()> {
        let (method, field) = match media.kind {
            MediaKind::Image => ("sendPhoto", "photo"),
            MediaKind::Video => ("sendVideo", "video"),
        };

        let bytes = tokio::fs::read(&media.path).await.map_err(|e| {
            PlatformError::Validation(format!(
                "media file {} is not readable: {}",
                media.path.display(),
                e
            ))
        })?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(media.file_name());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", target.to_string())
            .part(field, part);
        if !caption.is_empty() {
            form = form
                .text("caption", caption.to_string())
                .text("parse_mode", "HTML");
        }

        let response = self
            .http
            .post(format!("{}/{}", self.bot_url, method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("{} failed: {}", method, e)))?;

        Self::read_response::<serde_json::Value>(response, method).await?;
        tracing::debug!(chat_id = target, method, "Telegram media sent");
        Ok(())
    }
}
