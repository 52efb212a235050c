//! WhatsApp Business Cloud API client (text messages)
//!
//! Credentials: `{"phone_number_id": "...", "access_token": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{PlatformError, Result};
use crate::platforms::{
    http_client, status_error, Connection, PlatformClient, SessionEvent, SessionEventSender,
};
use crate::types::{PlatformAccount, PlatformKind};

#[derive(Debug, Deserialize)]
struct CloudCredentials {
    phone_number_id: String,
    access_token: String,
}

/// Strip the `+` prefix and `@c.us` suffix used by web-client style ids
pub fn normalize_target(target: &str) -> String {
    let target = target.trim();
    let target = target.strip_suffix("@c.us").unwrap_or(target);
    let target = target.strip_prefix('+').unwrap_or(target);
    target.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}

pub struct WhatsAppCloudClient {
    http: reqwest::Client,
    api_base: String,
}

impl WhatsAppCloudClient {
    pub fn new(api_base: &str) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PlatformClient for WhatsAppCloudClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::WhatsApp
    }

    async fn connect(
        &self,
        account: &PlatformAccount,
        events: SessionEventSender,
    ) -> Result<Box<dyn Connection>> {
        let raw = account.credentials.as_deref().ok_or_else(|| {
            PlatformError::Authentication(format!("account {} has no access token", account.id))
        })?;
        let creds: CloudCredentials = serde_json::from_str(raw).map_err(|e| {
            PlatformError::Authentication(format!("unreadable WhatsApp credentials: {}", e))
        })?;

        // Verify token by fetching the phone number object
        let response = self
            .http
            .get(format!("{}/{}", self.api_base, creds.phone_number_id))
            .bearer_auth(&creds.access_token)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("WhatsApp verification failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(match status_error(status, &text) {
                PlatformError::Send(msg) => PlatformError::Authentication(msg),
                other => other,
            }
            .into());
        }

        tracing::info!(
            account_id = %account.id,
            phone_number_id = %creds.phone_number_id,
            "WhatsApp Cloud connected"
        );
        let _ = events.send(SessionEvent::Ready);

        Ok(Box::new(WhatsAppCloudConnection {
            http: self.http.clone(),
            messages_url: format!("{}/{}/messages", self.api_base, creds.phone_number_id),
            access_token: creds.access_token,
        }))
    }
}

pub struct WhatsAppCloudConnection {
    http: reqwest::Client,
    messages_url: String,
    access_token: String,
}

#[async_trait]
impl Connection for WhatsAppCloudConnection {
    async fn send_text(&self, target: &str, text: &str) -> Result<()> {
        let to = normalize_target(target);
        if to.is_empty() {
            return Err(PlatformError::Validation(format!("invalid WhatsApp number '{}'", target)).into());
        }

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("WhatsApp API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text).into());
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Send(format!("Invalid WhatsApp response: {}", e)))?;
        let message_id = result["messages"][0]["id"].as_str().unwrap_or("unknown");

        tracing::debug!(message_id, to = %to, "WhatsApp message sent");
        Ok(())
    }
}
