//! Socialcast - scheduled campaigns and posts for messaging platforms
//!
//! This library provides the dispatch core behind the `social-send` daemon
//! and the `social-queue` CLI: a recurring scanner that finds due campaigns
//! and scheduled posts, pushes them through per-account platform sessions,
//! and records every outcome in a SQLite store.

pub mod analytics;
pub mod chatbot;
pub mod clock;
pub mod config;
pub mod db;
pub mod delay;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod processor;
pub mod scanner;
pub mod scheduling;
pub mod service;
pub mod session;
pub mod tasks;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, PostFilter};
pub use dispatch::DispatchOutcome;
pub use error::{Result, SocialcastError};
pub use service::SocialcastService;
pub use types::{
    Campaign, CampaignStatus, PlatformAccount, PlatformKind, PostStatus, ScheduledPost,
};
