//! Core types for Socialcast
//!
//! Campaigns, scheduled posts, platform accounts and analytics events as the
//! dispatch core sees them. Timestamps are Unix seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Platforms
// ============================================================================

/// Messaging/social platform an account lives on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    WhatsApp,
    Telegram,
    Instagram,
    Facebook,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Telegram => "telegram",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
        }
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whatsapp" => Ok(Self::WhatsApp),
            "telegram" => Ok(Self::Telegram),
            "instagram" => Ok(Self::Instagram),
            "facebook" => Ok(Self::Facebook),
            _ => Err(format!(
                "Invalid platform: '{}'. Valid options: whatsapp, telegram, instagram, facebook",
                s
            )),
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Campaigns
// ============================================================================

/// Kind of bulk-send job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CampaignType {
    #[serde(rename = "whatsapp")]
    WhatsApp,
    #[serde(rename = "facebook-retargeting")]
    FacebookRetargeting,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::FacebookRetargeting => "facebook-retargeting",
        }
    }

    /// Whether the dispatcher drives this campaign through a live session.
    ///
    /// Only WhatsApp campaigns are sent; other types are claimed and then
    /// left alone by the dispatcher.
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::WhatsApp)
    }
}

impl FromStr for CampaignType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whatsapp" => Ok(Self::WhatsApp),
            "facebook-retargeting" => Ok(Self::FacebookRetargeting),
            _ => Err(format!(
                "Invalid campaign type: '{}'. Valid options: whatsapp, facebook-retargeting",
                s
            )),
        }
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            _ => Err(format!("Invalid campaign status: '{}'", s)),
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive range, in seconds, for the pause between two campaign sends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub const DEFAULT_MIN: u64 = 20;
    pub const DEFAULT_MAX: u64 = 90;

    /// Build a range, rejecting `min > max`
    pub fn new(min: u64, max: u64) -> Result<Self, String> {
        if min > max {
            return Err(format!(
                "Delay minimum ({}s) must not exceed maximum ({}s)",
                min, max
            ));
        }
        Ok(Self { min, max })
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: Self::DEFAULT_MIN,
            max: Self::DEFAULT_MAX,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignSchedule {
    pub is_scheduled: bool,
    pub send_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignMessage {
    pub text: String,
    pub media_url: Option<String>,
}

/// A bulk outbound-message job on one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub name: String,
    pub campaign_type: CampaignType,
    /// Phone numbers or platform user ids, sent in list order.
    /// Frozen once the campaign leaves `pending`.
    pub targets: Vec<String>,
    pub message: CampaignMessage,
    pub schedule: CampaignSchedule,
    pub delay: DelayRange,
    pub status: CampaignStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields a caller supplies when creating a campaign
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub user_id: String,
    pub account_id: String,
    pub name: String,
    pub campaign_type: CampaignType,
    pub targets: Vec<String>,
    pub message: CampaignMessage,
    pub schedule: CampaignSchedule,
    pub delay: Option<DelayRange>,
}

impl Campaign {
    pub fn from_new(new: NewCampaign, default_delay: DelayRange, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            account_id: new.account_id,
            name: new.name,
            campaign_type: new.campaign_type,
            targets: new.targets,
            message: new.message,
            schedule: new.schedule,
            delay: new.delay.unwrap_or(default_delay),
            status: CampaignStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Due for the scanner: pending, scheduled, and `send_at` reached
    pub fn is_due(&self, now: i64) -> bool {
        self.status == CampaignStatus::Pending
            && self.schedule.is_scheduled
            && self.schedule.send_at.is_some_and(|at| at <= now)
    }
}

// ============================================================================
// Scheduled posts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Image,
    Video,
    Text,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
        }
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "text" => Ok(Self::Text),
            _ => Err(format!(
                "Invalid post type: '{}'. Valid options: image, video, text",
                s
            )),
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Posted => "posted",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid post status: '{}'", s)),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostContent {
    pub caption: String,
    /// Local media file, possibly relative to the media base directory
    pub media_path: Option<String>,
    pub media_url: Option<String>,
}

/// A single deferred publish action for one platform account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    pub platform: PlatformKind,
    pub account_id: String,
    /// Chat id for Telegram, group id for Facebook, number for WhatsApp
    pub target_id: Option<String>,
    pub post_type: PostType,
    pub content: PostContent,
    pub scheduled_time: i64,
    pub status: PostStatus,
    pub posted_at: Option<i64>,
    pub error_message: Option<String>,
    /// Incremented on every failed attempt, never reset
    pub retry_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewScheduledPost {
    pub user_id: String,
    pub platform: PlatformKind,
    pub account_id: String,
    pub target_id: Option<String>,
    pub post_type: PostType,
    pub content: PostContent,
    pub scheduled_time: i64,
}

impl ScheduledPost {
    pub fn from_new(new: NewScheduledPost, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            platform: new.platform,
            account_id: new.account_id,
            target_id: new.target_id,
            post_type: new.post_type,
            content: new.content,
            scheduled_time: new.scheduled_time,
            status: PostStatus::Pending,
            posted_at: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.status == PostStatus::Pending && self.scheduled_time <= now
    }

    /// Record a successful publish
    pub fn mark_posted(&mut self, now: i64) {
        self.status = PostStatus::Posted;
        self.posted_at = Some(now);
        self.error_message = None;
        self.updated_at = now;
    }

    /// Record a failed attempt
    pub fn mark_failed(&mut self, message: String, now: i64) {
        self.status = PostStatus::Failed;
        self.error_message = Some(message);
        self.retry_count += 1;
        self.updated_at = now;
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Connected,
    Disconnected,
    PendingQr,
    Error,
    Expired,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::PendingQr => "pending_qr",
            Self::Error => "error",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "pending_qr" => Ok(Self::PendingQr),
            "error" => Ok(Self::Error),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid account status: '{}'", s)),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account on one platform, owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformAccount {
    pub id: String,
    pub user_id: String,
    pub platform: PlatformKind,
    pub display_name: String,
    /// Opaque session material; only the platform client interprets it.
    #[serde(skip_serializing)]
    pub credentials: Option<String>,
    pub status: AccountStatus,
    pub last_activity_at: Option<i64>,
    pub created_at: i64,
}

impl PlatformAccount {
    pub fn new(
        user_id: String,
        platform: PlatformKind,
        display_name: String,
        credentials: Option<String>,
        now: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            display_name,
            credentials,
            status: AccountStatus::Disconnected,
            last_activity_at: None,
            created_at: now,
        }
    }
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CampaignSent,
    CampaignFailed,
    MessageDelivered,
    MessageFailed,
    ChatbotReply,
    PostPublished,
    PostFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CampaignSent => "campaign_sent",
            Self::CampaignFailed => "campaign_failed",
            Self::MessageDelivered => "message_delivered",
            Self::MessageFailed => "message_failed",
            Self::ChatbotReply => "chatbot_reply",
            Self::PostPublished => "post_published",
            Self::PostFailed => "post_failed",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "campaign_sent" => Ok(Self::CampaignSent),
            "campaign_failed" => Ok(Self::CampaignFailed),
            "message_delivered" => Ok(Self::MessageDelivered),
            "message_failed" => Ok(Self::MessageFailed),
            "chatbot_reply" => Ok(Self::ChatbotReply),
            "post_published" => Ok(Self::PostPublished),
            "post_failed" => Ok(Self::PostFailed),
            _ => Err(format!("Invalid event type: '{}'", s)),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one dispatch outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Database row ID (None until stored)
    pub id: Option<i64>,
    pub user_id: String,
    pub campaign_id: Option<String>,
    pub post_id: Option<String>,
    pub event_type: EventType,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

// ============================================================================
// Chatbot
// ============================================================================

/// Keyword auto-reply attached to one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotRule {
    pub id: String,
    pub account_id: String,
    /// Stored lowercase
    pub keyword: String,
    pub response_text: String,
    pub is_enabled: bool,
    pub created_at: i64,
}

impl ChatbotRule {
    pub fn new(account_id: String, keyword: &str, response_text: String, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            keyword: keyword.trim().to_lowercase(),
            response_text,
            is_enabled: true,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kind_round_trip_strings() {
        for kind in [
            PlatformKind::WhatsApp,
            PlatformKind::Telegram,
            PlatformKind::Instagram,
            PlatformKind::Facebook,
        ] {
            assert_eq!(kind.as_str().parse::<PlatformKind>().unwrap(), kind);
        }
        assert_eq!("WhatsApp".parse::<PlatformKind>().unwrap(), PlatformKind::WhatsApp);
        assert!("myspace".parse::<PlatformKind>().is_err());
    }

    #[test]
    fn test_campaign_type_serde_names() {
        let json = serde_json::to_string(&CampaignType::FacebookRetargeting).unwrap();
        assert_eq!(json, "\"facebook-retargeting\"");
        let json = serde_json::to_string(&CampaignType::WhatsApp).unwrap();
        assert_eq!(json, "\"whatsapp\"");
    }

    #[test]
    fn test_only_whatsapp_campaigns_require_session() {
        assert!(CampaignType::WhatsApp.requires_session());
        assert!(!CampaignType::FacebookRetargeting.requires_session());
    }

    #[test]
    fn test_delay_range_defaults_and_validation() {
        let delay = DelayRange::default();
        assert_eq!((delay.min, delay.max), (20, 90));

        assert!(DelayRange::new(5, 5).is_ok());
        let err = DelayRange::new(10, 5).unwrap_err();
        assert!(err.contains("must not exceed"));
    }

    #[test]
    fn test_campaign_due_requires_schedule_flag() {
        let mut campaign = Campaign::from_new(
            NewCampaign {
                user_id: "u1".to_string(),
                account_id: "a1".to_string(),
                name: "launch".to_string(),
                campaign_type: CampaignType::WhatsApp,
                targets: vec!["1".to_string()],
                message: CampaignMessage {
                    text: "hi".to_string(),
                    media_url: None,
                },
                schedule: CampaignSchedule {
                    is_scheduled: false,
                    send_at: Some(100),
                },
                delay: None,
            },
            DelayRange::default(),
            50,
        );
        assert!(!campaign.is_due(200));

        campaign.schedule.is_scheduled = true;
        assert!(campaign.is_due(100));
        assert!(!campaign.is_due(99));

        campaign.status = CampaignStatus::Running;
        assert!(!campaign.is_due(200));
    }

    #[test]
    fn test_post_failure_bookkeeping() {
        let mut post = ScheduledPost::from_new(
            NewScheduledPost {
                user_id: "u1".to_string(),
                platform: PlatformKind::Telegram,
                account_id: "a1".to_string(),
                target_id: None,
                post_type: PostType::Text,
                content: PostContent::default(),
                scheduled_time: 10,
            },
            0,
        );

        post.mark_failed("boom".to_string(), 20);
        post.mark_failed("boom again".to_string(), 30);
        assert_eq!(post.status, PostStatus::Failed);
        assert_eq!(post.retry_count, 2);
        assert_eq!(post.error_message.as_deref(), Some("boom again"));

        post.mark_posted(40);
        assert_eq!(post.status, PostStatus::Posted);
        assert_eq!(post.posted_at, Some(40));
        assert!(post.error_message.is_none());
        assert_eq!(post.retry_count, 2, "retry count is never reset");
    }

    #[test]
    fn test_account_status_snake_case() {
        assert_eq!(AccountStatus::PendingQr.as_str(), "pending_qr");
        assert_eq!(
            "pending_qr".parse::<AccountStatus>().unwrap(),
            AccountStatus::PendingQr
        );
        let json = serde_json::to_string(&AccountStatus::PendingQr).unwrap();
        assert_eq!(json, "\"pending_qr\"");
    }

    #[test]
    fn test_account_credentials_not_serialized() {
        let account = PlatformAccount::new(
            "u1".to_string(),
            PlatformKind::Telegram,
            "@bot".to_string(),
            Some("{\"bot_token\":\"secret\"}".to_string()),
            0,
        );
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_chatbot_rule_keyword_lowercased() {
        let rule = ChatbotRule::new("a1".to_string(), "  PRICE ", "10 USD".to_string(), 0);
        assert_eq!(rule.keyword, "price");
        assert!(rule.is_enabled);
    }
}
