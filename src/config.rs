use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single-writer SQLite file behind the concurrency guard.
    #[default]
    Embedded,
    /// Connection pool with real transactions.
    Pooled,
    /// In-process document store; users only.
    Documents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Wrap the backend in the concurrency guard. Unset means "only when embedded".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<bool>,
}

impl StorageConfig {
    pub fn use_lock(&self) -> bool {
        self.lock.unwrap_or(self.backend == Backend::Embedded)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            db_path: default_db_path(),
            max_connections: default_max_connections(),
            lock: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default = "default_display_count")]
    pub default_display_count: usize,

    #[serde(default = "default_feed_refresh_minutes")]
    pub feed_refresh_minutes: u32,

    #[serde(default = "default_feed_item_limit")]
    pub feed_item_limit: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("homeboard")
        .join("homeboard.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_display_count() -> usize {
    5
}

fn default_feed_refresh_minutes() -> u32 {
    15
}

fn default_feed_item_limit() -> usize {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_fetch_concurrency() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            default_display_count: default_display_count(),
            feed_refresh_minutes: default_feed_refresh_minutes(),
            feed_item_limit: default_feed_item_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("homeboard")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config("request_timeout_secs must be positive".into()));
        }
        if self.fetch_concurrency == 0 {
            return Err(AppError::Config("fetch_concurrency must be positive".into()));
        }
        Ok(())
    }
}
