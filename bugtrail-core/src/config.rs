//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/bugtrail/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/bugtrail/` (~/.config/bugtrail/)
//! - Data: `$XDG_DATA_HOME/bugtrail/` (~/.local/share/bugtrail/)
//! - State/Logs: `$XDG_STATE_HOME/bugtrail/` (~/.local/state/bugtrail/)

use crate::error::{Error, Result};
use crate::policy::RetryPolicy;
use crate::report::Identity;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Collector endpoint and identity
    #[serde(default)]
    pub collector: CollectorConfig,

    /// How reports are delivered
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Identity of the embedding application
    #[serde(default)]
    pub app: AppConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Report collector configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Endpoint receiving the report POST (e.g., `https://collector.example.com/api/v1/reports.json`)
    pub server_url: Option<String>,

    /// API key identifying the receiving team
    pub api_key: Option<String>,

    /// Email address to route reports to when no API key is configured
    pub email: Option<String>,

    /// HTTP read timeout in seconds
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,

    /// HTTP connect timeout in seconds
    #[serde(default = "default_collector_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            email: None,
            timeout_secs: default_collector_timeout(),
            connect_timeout_secs: default_collector_connect_timeout(),
        }
    }
}

impl CollectorConfig {
    /// Check if the collector has an endpoint and an identity
    pub fn is_ready(&self) -> bool {
        self.server_url.is_some() && self.identity().is_some()
    }

    /// Identity reports are routed by. The API key wins over the email.
    pub fn identity(&self) -> Option<Identity> {
        let non_blank = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        non_blank(&self.api_key)
            .map(Identity::ApiKey)
            .or_else(|| non_blank(&self.email).map(Identity::Email))
    }

    /// Validate what the transport needs: an endpoint and usable timeouts.
    ///
    /// Identity is not checked here. Queued documents already carry one and
    /// callers may pass one per report.
    pub fn validate_endpoint(&self) -> Result<()> {
        if self.server_url.is_none() {
            return Err(Error::Config("collector.server_url is required".to_string()));
        }
        if self.timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "collector timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        self.validate_endpoint()?;
        if self.identity().is_none() {
            return Err(Error::Config(
                "collector.api_key or collector.email is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_collector_timeout() -> u64 {
    30
}

fn default_collector_connect_timeout() -> u64 {
    30
}

/// Delivery configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct DeliveryConfig {
    /// Retry policy applied to submitted reports
    #[serde(default)]
    pub policy: RetryPolicy,

    /// Override for the durable queue file
    pub queue_path: Option<PathBuf>,

    /// Override for the scheduled job spool directory
    pub jobs_dir: Option<PathBuf>,
}

impl DeliveryConfig {
    pub fn queue_path(&self) -> PathBuf {
        self.queue_path.clone().unwrap_or_else(Config::queue_path)
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.jobs_dir.clone().unwrap_or_else(Config::jobs_dir)
    }
}

/// Identity of the application the reports are about
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub bundle_identifier: String,
    #[serde(default)]
    pub bundle_name: String,
    #[serde(default)]
    pub bundle_version: String,
    #[serde(default)]
    pub bundle_short_version: String,
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bundle_identifier: String::new(),
            bundle_name: String::new(),
            bundle_version: String::new(),
            bundle_short_version: String::new(),
            platform: default_platform(),
        }
    }
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/bugtrail/config.toml` (~/.config/bugtrail/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("bugtrail").join("config.toml")
    }

    /// Returns the data directory path (queue file and job spool)
    ///
    /// `$XDG_DATA_HOME/bugtrail/` (~/.local/share/bugtrail/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("bugtrail")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/bugtrail/` (~/.local/state/bugtrail/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("bugtrail")
    }

    /// Returns the default durable queue path
    ///
    /// `$XDG_DATA_HOME/bugtrail/report_queue.jsonl`
    pub fn queue_path() -> PathBuf {
        Self::data_dir().join("report_queue.jsonl")
    }

    /// Returns the default scheduled job spool directory
    ///
    /// `$XDG_DATA_HOME/bugtrail/jobs/`
    pub fn jobs_dir() -> PathBuf {
        Self::data_dir().join("jobs")
    }

    /// Returns the directory holding the daily log files
    ///
    /// `$XDG_STATE_HOME/bugtrail/` with files named `bugtrail.YYYY-MM-DD.log`
    pub fn log_dir() -> PathBuf {
        Self::state_dir()
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
