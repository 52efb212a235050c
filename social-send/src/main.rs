//! social-send - Background daemon for campaigns and scheduled posts
//!
//! Restores live sessions for connected accounts, then scans the store for
//! due campaigns and posts until told to stop.

use std::path::PathBuf;

use clap::Parser;
use libsocialcast::logging::{LogFormat, LoggingConfig};
use libsocialcast::service::{ServiceDeps, SocialcastService};
use libsocialcast::{Config, SocialcastError};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "social-send")]
#[command(version)]
#[command(about = "Background daemon that dispatches due campaigns and scheduled posts")]
#[command(long_about = "\
social-send - Background daemon for campaigns and scheduled posts

DESCRIPTION:
    social-send is a long-running daemon. On startup it reconnects every
    account that was connected when it last ran, then scans the store on
    two timers: one for scheduled campaigns, one for scheduled posts.

    Every due campaign is sent target by target with a random pause
    between messages. Every due post is published once; failures are
    recorded on the post and are not retried automatically.

USAGE:
    # Run in foreground (logs to stderr)
    social-send

    # JSON logs for a log collector
    social-send --log-format json

    # One scan of both queues, wait for the work, exit
    social-send --once

SIGNALS:
    SIGTERM, SIGINT - Stop scanning, wait for in-flight work up to
                      scheduler.shutdown_grace seconds, then exit

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Override with --config or SOCIALCAST_CONFIG.

    [scheduler]
    campaign_interval = 60  # seconds between campaign scans
    post_interval = 60      # seconds between post scans
    restore_delay = 2       # seconds before reconnecting accounts
    shutdown_grace = 30     # seconds to wait for in-flight work

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "SOCIALCAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Scan once, wait for the launched work, and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json, pretty
    #[arg(long, env = "SOCIALCAST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "SOCIALCAST_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::new(cli.log_format, cli.log_level.clone(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!(error = %e, "social-send failed");
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<SocialcastError>()
            .map(SocialcastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let deps = ServiceDeps::from_config(&config)?;
    let service = SocialcastService::from_config(config, deps).await?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        once = cli.once,
        "social-send starting"
    );

    if cli.once {
        run_once(&service).await;
    } else {
        run_daemon(&service).await?;
    }

    service.registry().shutdown().await;
    info!("social-send stopped");
    Ok(())
}

async fn run_once(service: &SocialcastService) {
    let scanner = service.scanner();
    match scanner.scan_campaigns().await {
        Ok(n) => info!(launched = n, "Campaign scan complete"),
        Err(e) => error!(error = %e, "Campaign scan failed"),
    }
    match scanner.scan_posts().await {
        Ok(n) => info!(launched = n, "Post scan complete"),
        Err(e) => error!(error = %e, "Post scan failed"),
    }

    let summary = service.tracker().drain(None).await;
    info!(completed = summary.completed, "Launched work finished");
}

async fn run_daemon(service: &SocialcastService) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    setup_signal_handlers(shutdown_tx)?;

    let restore_delay = service.config().scheduler.restore_delay();
    let registry = service.registry().clone();
    let mut restore_shutdown = shutdown_rx.clone();
    service.tracker().spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(restore_delay) => {}
            _ = restore_shutdown.changed() => return,
        }
        match registry.restore_connected().await {
            Ok(summary) => info!(
                restored = summary.restored,
                failed = summary.failed,
                "Session restoration finished"
            ),
            Err(e) => error!(error = %e, "Session restoration failed"),
        }
    });

    service.scanner().run(shutdown_rx).await;

    let grace = service.config().scheduler.shutdown_grace();
    info!(
        in_flight = service.tracker().len(),
        grace_secs = grace.as_secs(),
        "Waiting for in-flight work"
    );
    let summary = service.tracker().drain(Some(grace)).await;
    if summary.aborted > 0 {
        warn!(
            aborted = summary.aborted,
            "In-flight work abandoned; interrupted campaigns stay running"
        );
    }
    Ok(())
}

/// Flip `shutdown` on the first SIGINT or SIGTERM
#[cfg(unix)]
fn setup_signal_handlers(shutdown: watch::Sender<bool>) -> anyhow::Result<()> {
    use anyhow::Context;
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!(signal, "Received shutdown signal, stopping gracefully");
            let _ = shutdown.send(true);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: watch::Sender<bool>) -> anyhow::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully");
            let _ = shutdown.send(true);
        }
    });
    Ok(())
}
