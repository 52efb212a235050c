//! social-queue - Inspect and steer scheduled posts, campaigns and accounts
//!
//! Operator tool over the same store the social-send daemon reads.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use libsocialcast::analytics::{CampaignReport, Dashboard};
use libsocialcast::error::PlatformError;
use libsocialcast::logging::{LogFormat, LoggingConfig};
use libsocialcast::scheduling::parse_send_at;
use libsocialcast::service::posts::PostStats;
use libsocialcast::service::{ServiceDeps, SocialcastService};
use libsocialcast::{
    Campaign, CampaignStatus, Config, DispatchOutcome, PlatformAccount, PlatformKind, PostFilter,
    PostStatus, Result, ScheduledPost, SocialcastError,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "social-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts, campaigns and accounts")]
#[command(long_about = "\
social-queue - Manage scheduled posts, campaigns and accounts

DESCRIPTION:
    social-queue works on the store shared with the social-send daemon.
    Use it to look at what is queued, publish or cancel posts, start or
    pause campaigns, and read campaign reports.

COMMANDS:
    posts       list, now, cancel, reschedule, stats
    campaigns   list, run, pause, report, dashboard
    accounts    list

USAGE EXAMPLES:
    # Pending posts for one platform
    social-queue posts list --status pending --platform telegram

    # Publish a post right away
    social-queue posts now <POST_ID>

    # Move a post to a new time (RFC 3339, \"YYYY-MM-DD HH:MM\" UTC, or \"2h\")
    social-queue posts reschedule <POST_ID> \"2h 30m\"

    # Send a pending campaign in the foreground
    social-queue campaigns run <CAMPAIGN_ID>

    # Report as JSON
    social-queue campaigns report <CAMPAIGN_ID> --format json

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Override with --config or SOCIALCAST_CONFIG.

EXIT CODES:
    0 - Success
    1 - Operation failed (database, configuration or platform)
    2 - Account session could not be established
    3 - Invalid input (unknown id, wrong state, bad time format)
")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "SOCIALCAST_CONFIG", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: text, json, pretty
    #[arg(long, env = "SOCIALCAST_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "SOCIALCAST_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scheduled posts
    #[command(subcommand)]
    Posts(PostCommand),

    /// Bulk-send campaigns
    #[command(subcommand)]
    Campaigns(CampaignCommand),

    /// Connected platform accounts
    #[command(subcommand)]
    Accounts(AccountCommand),
}

#[derive(Subcommand, Debug)]
enum PostCommand {
    /// List scheduled posts, soonest first
    List {
        /// Only posts in this state (pending, posted, failed, cancelled)
        #[arg(long)]
        status: Option<PostStatus>,

        /// Only posts for this platform
        #[arg(long)]
        platform: Option<PlatformKind>,

        /// Only posts owned by this user
        #[arg(long)]
        user: Option<String>,

        /// Maximum number of posts
        #[arg(long)]
        limit: Option<i64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Publish a post immediately
    Now {
        /// Post ID
        post_id: String,
    },

    /// Cancel a pending post
    Cancel {
        /// Post ID
        post_id: String,
    },

    /// Move a post to a new time and queue it again
    Reschedule {
        /// Post ID
        post_id: String,

        /// New time: RFC 3339, "YYYY-MM-DD HH:MM[:SS]" (UTC), or a duration like "2h"
        time: String,
    },

    /// Count posts per state
    Stats {
        /// Only posts owned by this user
        #[arg(long)]
        user: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand, Debug)]
enum CampaignCommand {
    /// List campaigns, newest first
    List {
        /// Only campaigns owned by this user
        #[arg(long)]
        user: Option<String>,

        /// Only campaigns in this state
        #[arg(long)]
        status: Option<CampaignStatus>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Send a pending campaign now, in the foreground
    Run {
        /// Campaign ID
        campaign_id: String,
    },

    /// Stop a running campaign before its next target
    Pause {
        /// Campaign ID
        campaign_id: String,
    },

    /// Per-target outcome of a campaign
    Report {
        /// Campaign ID
        campaign_id: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Campaign and message totals for one user
    Dashboard {
        /// User ID
        user_id: String,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// List platform accounts
    List {
        /// Only accounts owned by this user
        #[arg(long)]
        user: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::new(cli.log_format, cli.log_level.clone(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        tracing::debug!(error = ?e, "social-queue failed");
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let deps = ServiceDeps::from_config(&config)?;
    let service = SocialcastService::from_config(config, deps).await?;

    let result = match cli.command {
        Commands::Posts(cmd) => run_posts(&service, cmd).await,
        Commands::Campaigns(cmd) => run_campaigns(&service, cmd).await,
        Commands::Accounts(cmd) => run_accounts(&service, cmd).await,
    };

    service.registry().shutdown().await;
    result
}

// ============================================================================
// Posts
// ============================================================================

async fn run_posts(service: &SocialcastService, cmd: PostCommand) -> Result<()> {
    let posts = service.posts();
    match cmd {
        PostCommand::List {
            status,
            platform,
            user,
            limit,
            output,
        } => {
            if let Some(limit) = limit {
                if limit <= 0 {
                    return Err(SocialcastError::InvalidInput(
                        "--limit must be positive".to_string(),
                    ));
                }
            }
            let filter = PostFilter {
                user_id: user,
                platform,
                status,
                limit,
            };
            let list = posts.list(&filter).await?;
            match output.format {
                OutputFormat::Json => print_json(&list)?,
                OutputFormat::Text => print_posts(&list, now()),
            }
        }
        PostCommand::Now { post_id } => {
            let post = posts.post_now(&post_id).await?;
            match post.status {
                PostStatus::Posted => println!("{} posted", post.id),
                _ => {
                    return Err(SocialcastError::Platform(PlatformError::Send(
                        post.error_message
                            .unwrap_or_else(|| "publish failed".to_string()),
                    )))
                }
            }
        }
        PostCommand::Cancel { post_id } => {
            posts.cancel(&post_id).await?;
            println!("{} cancelled", post_id);
        }
        PostCommand::Reschedule { post_id, time } => {
            let scheduled_time = parse_send_at(&time, now())?;
            let post = posts.reschedule(&post_id, scheduled_time).await?;
            println!(
                "{} rescheduled for {}",
                post.id,
                format_timestamp(post.scheduled_time)
            );
        }
        PostCommand::Stats { user, output } => {
            let stats = posts.stats(user.as_deref()).await?;
            match output.format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Text => print_post_stats(&stats),
            }
        }
    }
    Ok(())
}

fn print_posts(posts: &[ScheduledPost], now: i64) {
    for post in posts {
        let when = match post.status {
            PostStatus::Pending => format_time_until(now, post.scheduled_time),
            PostStatus::Posted => post
                .posted_at
                .map(format_timestamp)
                .unwrap_or_else(|| "posted".to_string()),
            _ => format_timestamp(post.scheduled_time),
        };
        println!(
            "{} | {} | {} | {} | {} | {}",
            post.id,
            post.platform,
            post.post_type,
            post.status,
            truncate_content(&post.content.caption, 40),
            when
        );
        if let Some(error) = &post.error_message {
            println!("    error: {} (attempts: {})", error, post.retry_count);
        }
    }
}

fn print_post_stats(stats: &PostStats) {
    println!("Total:     {}", stats.total);
    println!("Pending:   {}", stats.pending);
    println!("Posted:    {}", stats.posted);
    println!("Failed:    {}", stats.failed);
    println!("Cancelled: {}", stats.cancelled);
}

// ============================================================================
// Campaigns
// ============================================================================

async fn run_campaigns(service: &SocialcastService, cmd: CampaignCommand) -> Result<()> {
    let campaigns = service.campaigns();
    match cmd {
        CampaignCommand::List {
            user,
            status,
            output,
        } => {
            let list = campaigns.list(user.as_deref(), status).await?;
            match output.format {
                OutputFormat::Json => print_json(&list)?,
                OutputFormat::Text => print_campaigns(&list),
            }
        }
        CampaignCommand::Run { campaign_id } => {
            let outcome = campaigns.run(&campaign_id).await?;
            report_outcome(&campaign_id, outcome)?;
        }
        CampaignCommand::Pause { campaign_id } => {
            campaigns.pause(&campaign_id).await?;
            println!("{} paused", campaign_id);
        }
        CampaignCommand::Report {
            campaign_id,
            output,
        } => {
            let report = campaigns.report(&campaign_id).await?;
            match output.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => print_report(&report),
            }
        }
        CampaignCommand::Dashboard { user_id, output } => {
            let dashboard = campaigns.dashboard(&user_id).await?;
            match output.format {
                OutputFormat::Json => print_json(&dashboard)?,
                OutputFormat::Text => print_dashboard(&dashboard),
            }
        }
    }
    Ok(())
}

fn report_outcome(campaign_id: &str, outcome: DispatchOutcome) -> Result<()> {
    match outcome {
        DispatchOutcome::Completed { sent } => {
            println!("{} completed: {} sent", campaign_id, sent);
        }
        DispatchOutcome::Interrupted { sent, status } => {
            let status = status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "deleted".to_string());
            println!("{} stopped ({}) after {} sent", campaign_id, status, sent);
        }
        DispatchOutcome::Skipped => {
            println!("{} is not sent through a session; left running", campaign_id);
        }
        DispatchOutcome::AlreadyClaimed => {
            return Err(SocialcastError::InvalidInput(format!(
                "Campaign {} was started elsewhere",
                campaign_id
            )));
        }
        DispatchOutcome::Failed { sent, error } => {
            println!("{} failed after {} sent", campaign_id, sent);
            return Err(SocialcastError::Platform(PlatformError::Send(error)));
        }
    }
    Ok(())
}

fn print_campaigns(campaigns: &[Campaign]) {
    for campaign in campaigns {
        let when = match campaign.schedule.send_at {
            Some(ts) if campaign.schedule.is_scheduled => format_timestamp(ts),
            _ => "immediate".to_string(),
        };
        println!(
            "{} | {} | {} | {} | {} targets | {}",
            campaign.id,
            campaign.name,
            campaign.campaign_type,
            campaign.status,
            campaign.targets.len(),
            when
        );
    }
}

fn print_report(report: &CampaignReport) {
    println!("Campaign: {} ({})", report.name, report.campaign_id);
    println!("Status:   {}", report.status);
    println!("Targets:  {}", report.target_count);
    println!("Sent:     {}", report.sent);
    println!("Failed:   {}", report.failed);
    for event in &report.events {
        let target = event
            .metadata
            .as_ref()
            .and_then(|m| m.get("target"))
            .and_then(|t| t.as_str())
            .unwrap_or("-");
        println!(
            "  {} {} {}",
            format_timestamp(event.created_at),
            event.event_type,
            target
        );
    }
}

fn print_dashboard(dashboard: &Dashboard) {
    let c = &dashboard.campaigns;
    println!(
        "Campaigns: {} total, {} pending, {} running, {} completed, {} failed, {} paused",
        c.total, c.pending, c.running, c.completed, c.failed, c.paused
    );
    println!("Success rate: {:.2}%", c.success_rate);
    println!("Messages sent: {}", dashboard.messages_sent);
    println!("Chatbot replies: {}", dashboard.chatbot_replies);
    for (day, count) in &dashboard.recent_activity {
        println!("  {} {}", day, count);
    }
}

// ============================================================================
// Accounts
// ============================================================================

async fn run_accounts(service: &SocialcastService, cmd: AccountCommand) -> Result<()> {
    match cmd {
        AccountCommand::List { user, output } => {
            let accounts = service.accounts().list(user.as_deref()).await?;
            match output.format {
                OutputFormat::Json => print_json(&accounts)?,
                OutputFormat::Text => print_accounts(&accounts),
            }
        }
    }
    Ok(())
}

fn print_accounts(accounts: &[PlatformAccount]) {
    for account in accounts {
        let last = account
            .last_activity_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} | {} | {} | {} | {}",
            account.id, account.platform, account.display_name, account.status, last
        );
    }
}

// ============================================================================
// Formatting
// ============================================================================

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        SocialcastError::InvalidInput(format!("Failed to encode output as JSON: {}", e))
    })?;
    println!("{}", json);
    Ok(())
}

/// Truncate to `max_chars` characters with an ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let head: String = single_line.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;
    if diff < 0 {
        return "overdue".to_string();
    }
    if diff < 60 {
        return "in <1 minute".to_string();
    }
    // Minute resolution is enough for a queue listing
    let rounded = Duration::from_secs((diff as u64 / 60) * 60);
    format!("in {}", humantime::format_duration(rounded))
}
