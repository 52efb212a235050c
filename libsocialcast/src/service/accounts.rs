//! Platform accounts and their chatbot rules

use std::sync::Arc;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::{Result, SocialcastError};
use crate::session::SessionRegistry;
use crate::types::{ChatbotRule, PlatformAccount, PlatformKind};

#[derive(Clone)]
pub struct AccountService {
    db: Database,
    registry: SessionRegistry,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(db: Database, registry: SessionRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            registry,
            clock,
        }
    }

    /// Store a new account; it stays `disconnected` until a session opens
    pub async fn register(
        &self,
        user_id: &str,
        platform: PlatformKind,
        display_name: &str,
        credentials: Option<String>,
    ) -> Result<PlatformAccount> {
        if display_name.trim().is_empty() {
            return Err(SocialcastError::InvalidInput(
                "Account name cannot be empty".to_string(),
            ));
        }

        let account = PlatformAccount::new(
            user_id.to_string(),
            platform,
            display_name.trim().to_string(),
            credentials,
            self.clock.now(),
        );
        self.db.create_account(&account).await?;
        tracing::info!(account_id = %account.id, platform = %platform, "Registered account");
        Ok(account)
    }

    pub async fn get(&self, account_id: &str) -> Result<PlatformAccount> {
        self.db
            .get_account(account_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("account {}", account_id)))
    }

    pub async fn list(&self, user_id: Option<&str>) -> Result<Vec<PlatformAccount>> {
        self.db.list_accounts(user_id).await
    }

    /// Close the account's live session, if any, and mark it disconnected
    pub async fn disconnect(&self, account_id: &str) -> Result<bool> {
        self.get(account_id).await?;
        self.registry.disconnect(account_id).await
    }

    pub async fn add_chatbot_rule(
        &self,
        account_id: &str,
        keyword: &str,
        response_text: &str,
    ) -> Result<ChatbotRule> {
        self.get(account_id).await?;
        if keyword.trim().is_empty() || response_text.trim().is_empty() {
            return Err(SocialcastError::InvalidInput(
                "Chatbot rules need a keyword and a response".to_string(),
            ));
        }

        let rule = ChatbotRule::new(
            account_id.to_string(),
            keyword,
            response_text.to_string(),
            self.clock.now(),
        );
        self.db.create_rule(&rule).await?;
        Ok(rule)
    }

    pub async fn rules(&self, account_id: &str) -> Result<Vec<ChatbotRule>> {
        self.db.rules_for_account(account_id, false).await
    }

    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<()> {
        if self.db.set_rule_enabled(rule_id, enabled).await? {
            Ok(())
        } else {
            Err(SocialcastError::NotFound(format!("chatbot rule {}", rule_id)))
        }
    }
}
