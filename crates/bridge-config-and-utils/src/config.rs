//! Configuration management for the bridge.

use crate::{CoreError, CoreResult};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Default display timezone for relayed timestamps.
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// Default remote polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Matrix homeserver connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeserverConfig {
    /// Base URL of the homeserver (e.g. `https://matrix.example.org`).
    pub address: String,
    /// Server name used in room aliases and `via` hints.
    pub domain: String,
    /// Fully-qualified Matrix user id the bridge logs in as.
    pub user_id: String,
    /// Password for the bridge account.
    pub password: String,
}

/// Hostex API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostexConfig {
    /// Base URL of the Hostex API.
    pub api_url: String,
    /// Static access token sent on every request.
    pub token: String,
}

/// Main bridge configuration, loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Matrix homeserver settings.
    pub homeserver: HomeserverConfig,
    /// Hostex API settings.
    pub hostex: HostexConfig,
    /// Matrix user id allowed to issue management commands.
    pub admin_user_id: String,
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// IANA timezone name used when rendering relayed timestamps.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Seconds between Hostex polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Whether portal rooms are grouped under a personal space.
    #[serde(default)]
    pub personal_space_enabled: bool,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_database_path() -> String {
    "bridge.db".to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Config {
    /// Load configuration from a YAML file, then apply env overrides.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.load_from_env();
        Ok(config)
    }

    /// Override configuration from environment variables.
    ///
    /// Only `BRIDGE_LOG_LEVEL` can be overridden at runtime; everything else
    /// comes from the config file.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("BRIDGE_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Validate that all required fields are present and parseable.
    ///
    /// Called once at startup; a failure here is fatal.
    pub fn validate(&self) -> CoreResult<()> {
        if self.homeserver.address.is_empty() {
            return Err(CoreError::Config("homeserver.address is required".into()));
        }
        if self.homeserver.user_id.is_empty() {
            return Err(CoreError::Config("homeserver.user_id is required".into()));
        }
        if self.homeserver.password.is_empty() {
            return Err(CoreError::Config("homeserver.password is required".into()));
        }
        if self.hostex.api_url.is_empty() {
            return Err(CoreError::Config("hostex.api_url is required".into()));
        }
        if self.hostex.token.is_empty() {
            return Err(CoreError::Config("hostex.token is required".into()));
        }
        if self.admin_user_id.is_empty() {
            return Err(CoreError::Config("admin_user_id is required".into()));
        }
        Url::parse(&self.homeserver.address)?;
        Url::parse(&self.hostex.api_url)?;
        Ok(())
    }

    /// Get the polling interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Parse the configured display timezone.
    ///
    /// An unknown zone name logs a warning and falls back to UTC; it is
    /// never a startup failure.
    pub fn display_timezone(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone = %self.timezone, "Unknown timezone, falling back to UTC");
                Tz::UTC
            }
        }
    }
}
