//! Service layer for Socialcast
//!
//! `SocialcastService` wires the store, session registry, dispatcher,
//! processor and scanner together and hands out the sub-services the
//! binaries talk to:
//!
//! - `CampaignService`: create, edit, run, pause and report on campaigns
//! - `PostService`: manage scheduled posts and publish them on demand
//! - `AccountService`: platform accounts and chatbot rules
//! - `EventBus`: progress events from sessions, campaigns and posts
//!
//! # Example
//!
//! ```no_run
//! use libsocialcast::service::SocialcastService;
//!
//! # async fn example() -> libsocialcast::Result<()> {
//! let service = SocialcastService::new().await?;
//!
//! let restored = service.registry().restore_connected().await?;
//! println!("{} sessions restored", restored.restored);
//!
//! for campaign in service.campaigns().list(None, None).await? {
//!     println!("{} {}", campaign.id, campaign.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod campaigns;
pub mod events;
pub mod posts;

use std::sync::Arc;

use self::accounts::AccountService;
use self::campaigns::CampaignService;
use self::events::EventBus;
use self::posts::PostService;
use crate::analytics::AnalyticsRecorder;
use crate::clock::{Clock, SystemClock};
use crate::delay::{DelayPolicy, Sleeper, TokioSleeper};
use crate::dispatch::CampaignDispatcher;
use crate::error::{ConfigError, Result};
use crate::media::MediaResolver;
use crate::platforms::{build_clients, ClientMap};
use crate::processor::PostProcessor;
use crate::scanner::Scanner;
use crate::session::SessionRegistry;
use crate::tasks::TaskTracker;
use crate::{Config, Database};

/// Collaborators that tests replace
pub struct ServiceDeps {
    pub clients: ClientMap,
    pub clock: Arc<dyn Clock>,
    pub sleeper: Arc<dyn Sleeper>,
    pub delay: Arc<DelayPolicy>,
}

impl ServiceDeps {
    /// Real clients from `config`, wall clock, real sleeps, entropy-seeded delays
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            clients: build_clients(config)?,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            delay: Arc::new(DelayPolicy::new()),
        })
    }
}

/// Main service facade
///
/// Every sub-service shares one `Database` pool, one `SessionRegistry` and
/// one `TaskTracker`, so work launched from the CLI and from the scanner
/// goes through the same sessions and is drained together on shutdown.
pub struct SocialcastService {
    config: Arc<Config>,
    db: Database,
    registry: SessionRegistry,
    scanner: Scanner,
    tracker: TaskTracker,
    campaigns: CampaignService,
    posts: PostService,
    accounts: AccountService,
    event_bus: EventBus,
}

impl SocialcastService {
    /// Create a service from the default configuration file
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        let deps = ServiceDeps::from_config(&config)?;
        Self::from_config(config, deps).await
    }

    /// Create a service from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn from_config(config: Config, deps: ServiceDeps) -> Result<Self> {
        let db_path = config.db_path();
        let db_path = db_path.to_str().ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "database.path".to_string(),
                reason: "path is not valid UTF-8".to_string(),
            }
        })?;
        let db = Database::new(db_path).await?;

        let config = Arc::new(config);
        let event_bus = EventBus::default();
        let tracker = TaskTracker::new();
        let analytics = AnalyticsRecorder::new(db.clone(), deps.clock.clone());
        let media = MediaResolver::new(config.media.base_dir());

        let registry = SessionRegistry::new(
            db.clone(),
            deps.clients,
            deps.clock.clone(),
            event_bus.clone(),
            analytics.clone(),
        );
        let dispatcher = CampaignDispatcher::new(
            db.clone(),
            registry.clone(),
            deps.delay,
            deps.sleeper,
            analytics.clone(),
            event_bus.clone(),
            deps.clock.clone(),
        );
        let processor = PostProcessor::new(
            db.clone(),
            registry.clone(),
            media.clone(),
            analytics.clone(),
            event_bus.clone(),
            deps.clock.clone(),
        );
        let scanner = Scanner::new(
            db.clone(),
            dispatcher.clone(),
            processor.clone(),
            tracker.clone(),
            deps.clock.clone(),
            config.scheduler.campaign_interval(),
            config.scheduler.post_interval(),
        );

        let campaigns = CampaignService::new(
            db.clone(),
            dispatcher,
            tracker.clone(),
            analytics,
            deps.clock.clone(),
            config.campaigns.delay_range(),
        );
        let posts = PostService::new(db.clone(), processor, media, deps.clock.clone());
        let accounts = AccountService::new(db.clone(), registry.clone(), deps.clock);

        Ok(Self {
            config,
            db,
            registry,
            scanner,
            tracker,
            campaigns,
            posts,
            accounts,
            event_bus,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Tracker holding every fire-and-forget dispatch launched by this service
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn campaigns(&self) -> &CampaignService {
        &self.campaigns
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    /// Subscribe to progress events
    ///
    /// Multiple subscribers are supported; a slow subscriber loses the
    /// oldest events instead of slowing dispatch down.
    pub fn subscribe(&self) -> events::EventReceiver {
        self.event_bus.subscribe()
    }
}
