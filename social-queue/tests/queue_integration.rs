//! Integration tests for the social-queue CLI

use assert_cmd::Command;
use libsocialcast::types::{
    Campaign, CampaignMessage, CampaignSchedule, CampaignType, DelayRange, NewCampaign,
    NewScheduledPost, PlatformAccount, PlatformKind, PostContent, PostType, ScheduledPost,
};
use libsocialcast::{CampaignStatus, Database, PostStatus};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

struct TestEnv {
    _temp_dir: TempDir,
    config_path: String,
    db: Database,
}

impl TestEnv {
    async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let db_path = temp_dir.path().join("queue.db");

        let config_content = format!(
            r#"
[database]
path = "{}"

[media]
base_dir = "{}"
"#,
            db_path.display().to_string().replace('\\', "/"),
            temp_dir.path().display().to_string().replace('\\', "/")
        );
        fs::write(&config_path, config_content).unwrap();

        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        Self {
            _temp_dir: temp_dir,
            config_path: config_path.to_str().unwrap().to_string(),
            db,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("social-queue").unwrap();
        cmd.env_remove("SOCIALCAST_DB_PATH")
            .arg("--config")
            .arg(&self.config_path);
        cmd
    }

    async fn account(&self, platform: PlatformKind, name: &str) -> PlatformAccount {
        let account = PlatformAccount::new(
            "user-1".to_string(),
            platform,
            name.to_string(),
            Some(r#"{"bot_token":"SECRET-TOKEN"}"#.to_string()),
            0,
        );
        self.db.create_account(&account).await.unwrap();
        account
    }

    async fn post(&self, account: &PlatformAccount, caption: &str, offset: i64) -> ScheduledPost {
        let now = chrono::Utc::now().timestamp();
        let post = ScheduledPost::from_new(
            NewScheduledPost {
                user_id: "user-1".to_string(),
                platform: account.platform,
                account_id: account.id.clone(),
                target_id: None,
                post_type: PostType::Text,
                content: PostContent {
                    caption: caption.to_string(),
                    ..Default::default()
                },
                scheduled_time: now + offset,
            },
            now - 60,
        );
        self.db.create_post(&post).await.unwrap();
        post
    }

    async fn campaign(&self, account: &PlatformAccount, name: &str) -> Campaign {
        let now = chrono::Utc::now().timestamp();
        let campaign = Campaign::from_new(
            NewCampaign {
                user_id: "user-1".to_string(),
                account_id: account.id.clone(),
                name: name.to_string(),
                campaign_type: CampaignType::WhatsApp,
                targets: vec!["15550001".to_string(), "15550002".to_string()],
                message: CampaignMessage {
                    text: "Doors open at nine".to_string(),
                    media_url: None,
                },
                schedule: CampaignSchedule {
                    is_scheduled: true,
                    send_at: Some(now + 3600),
                },
                delay: Some(DelayRange { min: 0, max: 0 }),
            },
            DelayRange::default(),
            now - 60,
        );
        self.db.create_campaign(&campaign).await.unwrap();
        campaign
    }
}

#[test]
fn test_help_lists_command_groups() {
    Command::cargo_bin("social-queue")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("posts"))
        .stdout(predicate::str::contains("campaigns"))
        .stdout(predicate::str::contains("accounts"));
}

#[test]
fn test_subcommand_required() {
    Command::cargo_bin("social-queue").unwrap().assert().failure();
}

#[tokio::test]
async fn test_list_empty_queue() {
    let env = TestEnv::new().await;

    env.cmd()
        .args(["posts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    env.cmd()
        .args(["posts", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[tokio::test]
async fn test_list_filters_by_platform() {
    let env = TestEnv::new().await;
    let telegram = env.account(PlatformKind::Telegram, "channel").await;
    let facebook = env.account(PlatformKind::Facebook, "page").await;
    let tg_post = env.post(&telegram, "Telegram teaser", 3600).await;
    env.post(&facebook, "Facebook teaser", 7200).await;

    env.cmd()
        .args(["posts", "list", "--platform", "telegram"])
        .assert()
        .success()
        .stdout(predicate::str::contains(tg_post.id.as_str()))
        .stdout(predicate::str::contains("Telegram teaser"))
        .stdout(predicate::str::contains("Facebook teaser").not());
}

#[tokio::test]
async fn test_list_json_is_parseable() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Facebook, "page").await;
    env.post(&account, "First", 60).await;
    env.post(&account, "Second", 120).await;

    let output = env
        .cmd()
        .args(["posts", "list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let posts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let posts = posts.as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["content"]["caption"], "First");
    assert_eq!(posts[0]["status"], "pending");
}

#[tokio::test]
async fn test_invalid_status_filter_rejected() {
    let env = TestEnv::new().await;
    env.cmd()
        .args(["posts", "list", "--status", "sent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid"));
}

#[tokio::test]
async fn test_cancel_pending_post() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Facebook, "page").await;
    let post = env.post(&account, "Going away", 3600).await;

    env.cmd()
        .args(["posts", "cancel", &post.id])
        .assert()
        .success()
        .stdout(predicate::str::contains("cancelled"));

    let stored = env.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Cancelled);

    // Only pending posts can be cancelled
    env.cmd()
        .args(["posts", "cancel", &post.id])
        .assert()
        .code(3);
}

#[tokio::test]
async fn test_cancel_unknown_post() {
    let env = TestEnv::new().await;
    env.cmd()
        .args(["posts", "cancel", "no-such-post"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error"));
}

#[tokio::test]
async fn test_reschedule_with_relative_time() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Facebook, "page").await;
    let post = env.post(&account, "Later", 60).await;

    let before = chrono::Utc::now().timestamp();
    env.cmd()
        .args(["posts", "reschedule", &post.id, "2h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rescheduled"));
    let after = chrono::Utc::now().timestamp();

    let stored = env.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Pending);
    assert!(stored.scheduled_time >= before + 7200);
    assert!(stored.scheduled_time <= after + 7200);
}

#[tokio::test]
async fn test_reschedule_with_absolute_time() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Facebook, "page").await;
    let post = env.post(&account, "Fixed time", 60).await;

    env.cmd()
        .args(["posts", "reschedule", &post.id, "2030-01-15 09:30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2030-01-15 09:30:00 UTC"));

    let stored = env.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.scheduled_time, 1_894_699_800);
}

#[tokio::test]
async fn test_reschedule_rejects_garbage_time() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Facebook, "page").await;
    let post = env.post(&account, "Unchanged", 60).await;

    env.cmd()
        .args(["posts", "reschedule", &post.id, "next blue moon"])
        .assert()
        .code(3);

    let stored = env.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.scheduled_time, post.scheduled_time);
}

#[tokio::test]
async fn test_now_publishes_immediately() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Facebook, "page").await;
    let post = env.post(&account, "Right now", 86_400).await;

    env.cmd()
        .args(["posts", "now", &post.id])
        .assert()
        .success()
        .stdout(predicate::str::contains("posted"));

    let stored = env.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Posted);

    env.cmd()
        .args(["posts", "now", &post.id])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("already published"));
}

#[tokio::test]
async fn test_now_reports_publish_failure() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Telegram, "channel").await;
    let post = env.post(&account, "No chat id", 86_400).await;

    env.cmd()
        .args(["posts", "now", &post.id])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("target chat id"));

    let stored = env.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert_eq!(stored.retry_count, 1);
}

#[tokio::test]
async fn test_stats_json() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::Facebook, "page").await;
    env.post(&account, "One", 60).await;
    let cancelled = env.post(&account, "Two", 120).await;
    env.cmd()
        .args(["posts", "cancel", &cancelled.id])
        .assert()
        .success();

    let output = env
        .cmd()
        .args(["posts", "stats", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["cancelled"], 1);
}

#[tokio::test]
async fn test_campaign_list_and_report() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::WhatsApp, "shop").await;
    let campaign = env.campaign(&account, "spring-sale").await;

    env.cmd()
        .args(["campaigns", "list", "--status", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("spring-sale"))
        .stdout(predicate::str::contains("2 targets"));

    env.cmd()
        .args(["campaigns", "report", &campaign.id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Targets:  2"))
        .stdout(predicate::str::contains("Sent:     0"));
}

#[tokio::test]
async fn test_pause_requires_running_campaign() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::WhatsApp, "shop").await;
    let campaign = env.campaign(&account, "not-started").await;

    env.cmd()
        .args(["campaigns", "pause", &campaign.id])
        .assert()
        .code(3);

    assert_eq!(
        env.db.campaign_status(&campaign.id).await.unwrap(),
        Some(CampaignStatus::Pending)
    );
}

#[tokio::test]
async fn test_run_without_session_marks_campaign_failed() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::WhatsApp, "shop").await;
    let campaign = env.campaign(&account, "no-client").await;

    env.cmd()
        .args(["campaigns", "run", &campaign.id])
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed after 0 sent"));

    assert_eq!(
        env.db.campaign_status(&campaign.id).await.unwrap(),
        Some(CampaignStatus::Failed)
    );

    // A failed campaign cannot be run again
    env.cmd()
        .args(["campaigns", "run", &campaign.id])
        .assert()
        .code(3);
}

#[tokio::test]
async fn test_dashboard_json() {
    let env = TestEnv::new().await;
    let account = env.account(PlatformKind::WhatsApp, "shop").await;
    env.campaign(&account, "one").await;

    let output = env
        .cmd()
        .args(["campaigns", "dashboard", "user-1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let dashboard: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(dashboard["campaigns"]["total"], 1);
    assert_eq!(dashboard["campaigns"]["pending"], 1);
    assert_eq!(dashboard["messages_sent"], 0);
}

#[tokio::test]
async fn test_accounts_list_hides_credentials() {
    let env = TestEnv::new().await;
    env.account(PlatformKind::Telegram, "news-channel").await;

    env.cmd()
        .args(["accounts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("news-channel"))
        .stdout(predicate::str::contains("telegram"));

    env.cmd()
        .args(["accounts", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("news-channel"))
        .stdout(predicate::str::contains("SECRET-TOKEN").not());
}
