//! Configuration management for the anime tracker.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings and environment overrides for
//! deployment-specific values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Database settings
    pub database: DatabaseConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Shikimori API settings
    pub shikimori: ShikimoriConfig,

    /// Catalog cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (relative to data directory or absolute)
    pub path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Shikimori API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShikimoriConfig {
    /// API base URL
    pub base_url: String,

    /// Host prepended to relative image paths
    pub image_host: String,

    /// User-Agent header sent with every request (required upstream)
    pub user_agent: String,

    /// Local admission budget, requests per minute
    pub requests_per_minute: u32,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// How long a request may wait for rate limiter capacity, in seconds
    pub admission_timeout_secs: u64,

    /// Maximum number of search results requested
    pub search_limit: u32,
}

/// Backing store used by the catalog cache
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching
    pub enabled: bool,

    /// Backing store
    pub backend: CacheBackendKind,

    /// Redis connection URL (used when backend = "redis")
    pub redis_url: String,

    /// TTL for search results in seconds (0 = no expiry)
    pub search_ttl_secs: u64,

    /// TTL for anime details in seconds (0 = no expiry)
    pub details_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            search_ttl_secs: 60 * 60,
            details_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl Default for ShikimoriConfig {
    fn default() -> Self {
        Self {
            base_url: "https://shikimori.one/api".to_string(),
            image_host: "https://shikimori.one".to_string(),
            user_agent: "TelegramAnimeBot/1.0".to_string(),
            // Upstream allows 90/min; keep a buffer of 10
            requests_per_minute: 80,
            request_timeout_secs: 10,
            admission_timeout_secs: 30,
            search_limit: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
            },
            database: DatabaseConfig {
                path: "anime_tracker.db".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            shikimori: ShikimoriConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate the result
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment variables
    ///
    /// `lookup` resolves a variable name to its value, so tests can supply
    /// values without touching the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup("ANIME_TRACKER_DATA_DIR") {
            self.data.root_dir = dir;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(url) = lookup("SHIKIMORI_URL") {
            self.shikimori.base_url = url;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.cache.redis_url = url;
            self.cache.backend = CacheBackendKind::Redis;
        }
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.shikimori.requests_per_minute == 0 {
            bail!("shikimori.requests_per_minute must be greater than zero");
        }
        if self.shikimori.request_timeout_secs == 0 {
            bail!("shikimori.request_timeout_secs must be greater than zero");
        }
        if self.shikimori.search_limit == 0 {
            bail!("shikimori.search_limit must be greater than zero");
        }
        if self.shikimori.base_url.trim().is_empty() {
            bail!("shikimori.base_url must not be empty");
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the database file
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database.path)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}
