//! Configuration management for Socialcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::DelayRange;

pub const CONFIG_ENV: &str = "SOCIALCAST_CONFIG";
pub const DB_PATH_ENV: &str = "SOCIALCAST_DB_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub campaigns: CampaignDefaults,
    #[serde(default)]
    pub media: MediaConfig,
    pub telegram: Option<TelegramConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Scanner timing, all values in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub campaign_interval: u64,
    pub post_interval: u64,
    /// Pause before the startup session restoration sweep
    pub restore_delay: u64,
    /// How long shutdown waits for in-flight dispatches before aborting them
    pub shutdown_grace: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            campaign_interval: 60,
            post_interval: 60,
            restore_delay: 2,
            shutdown_grace: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn campaign_interval(&self) -> Duration {
        Duration::from_secs(self.campaign_interval)
    }

    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.post_interval)
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_secs(self.restore_delay)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

/// Delay range applied to campaigns created without one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignDefaults {
    pub delay_min: u64,
    pub delay_max: u64,
}

impl Default for CampaignDefaults {
    fn default() -> Self {
        Self {
            delay_min: DelayRange::DEFAULT_MIN,
            delay_max: DelayRange::DEFAULT_MAX,
        }
    }
}

impl CampaignDefaults {
    pub fn delay_range(&self) -> DelayRange {
        DelayRange {
            min: self.delay_min,
            max: self.delay_max,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Root for relative media paths; the working directory when unset
    pub base_dir: Option<String>,
}

impl MediaConfig {
    pub fn base_dir(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_whatsapp_api")]
    pub api_base: String,
}

fn default_true() -> bool {
    true
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_whatsapp_api() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path.
    ///
    /// `SOCIALCAST_DB_PATH` replaces `database.path` when set.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config = Self::from_toml(&content)?;

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            config.database.path = db_path;
        }

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }

        if self.campaigns.delay_min > self.campaigns.delay_max {
            return Err(ConfigError::InvalidValue {
                field: "campaigns.delay_min".to_string(),
                reason: format!(
                    "{} must not exceed delay_max ({})",
                    self.campaigns.delay_min, self.campaigns.delay_max
                ),
            }
            .into());
        }

        for (field, value) in [
            ("scheduler.campaign_interval", self.scheduler.campaign_interval),
            ("scheduler.post_interval", self.scheduler.post_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be at least 1 second".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Database path with `~` expanded
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database.path).to_string())
    }

    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/socialcast/socialcast.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            campaigns: CampaignDefaults::default(),
            media: MediaConfig::default(),
            telegram: Some(TelegramConfig {
                enabled: true,
                api_base: default_telegram_api(),
            }),
            whatsapp: Some(WhatsAppConfig {
                enabled: true,
                api_base: default_whatsapp_api(),
            }),
        }
    }
}

/// Resolve the configuration file path following the XDG Base Directory layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialcast").join("config.toml"))
}
