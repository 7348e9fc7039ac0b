//! Configuration management for the anime aggregator.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    #[serde(default)]
    pub data: DataConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Content provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Metadata source settings
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Identity crosswalk settings
    #[serde(default)]
    pub crosswalk: CrosswalkConfig,

    /// Stream extractor settings
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
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

/// Cache configuration
///
/// Every TTL is in seconds and applied once at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching. Disabled means every lookup misses.
    pub enabled: bool,

    /// Cache directory (relative to data directory or absolute)
    pub cache_dir: String,

    /// Provider anime pages (external links rarely change)
    pub anime_page_ttl_secs: u64,

    /// Provider episode listings
    pub episodes_ttl_secs: u64,

    /// Resolved stream links (expire upstream)
    pub streams_ttl_secs: u64,

    /// The whole identity crosswalk table
    pub crosswalk_ttl_secs: u64,

    /// AniList and Jikan responses
    pub metadata_ttl_secs: u64,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Transport timeout per request
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

/// Content provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// AnimePahe base URL
    pub base_url: String,
}

/// Metadata source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// AniList GraphQL endpoint
    pub anilist_url: String,

    /// Jikan API base URL
    pub jikan_url: String,

    /// Jikan rate limiting settings
    pub rate_limit: RateLimitConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: f64,

    /// Maximum requests per minute
    pub requests_per_minute: u32,
}

/// Identity crosswalk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosswalkConfig {
    /// Static URL of the full crosswalk table
    pub source_url: String,
}

/// Stream extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Referer the embed host requires
    pub referer: String,

    /// Wall-clock budget for one script evaluation
    pub script_timeout_ms: u64,

    /// Maximum loop iterations inside the evaluated script
    pub loop_iteration_limit: u64,

    /// Maximum call depth inside the evaluated script
    pub recursion_limit: usize,

    /// Largest payload handed to the sandbox
    pub max_script_bytes: usize,

    /// Largest completion value read back from the sandbox
    pub max_output_bytes: usize,

    /// Address space cap of the sandbox process
    pub memory_limit_mb: u64,

    /// Sandbox runner executable; defaults to `anime-sandbox` next to the
    /// running binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_runner: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root_dir: "data".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            default_level: "info".to_string(),
            console: true,
            file: false,
            json_format: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: "cache".to_string(),
            anime_page_ttl_secs: 60 * 60 * 7,
            episodes_ttl_secs: 60 * 30,
            streams_ttl_secs: 60 * 30,
            crosswalk_ttl_secs: 60 * 60 * 24,
            metadata_ttl_secs: 60 * 60 * 24,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent:
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:138.0) Gecko/20100101 Firefox/138.0"
                    .to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://animepahe.ru".to_string(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            anilist_url: "https://graphql.anilist.co".to_string(),
            jikan_url: "https://api.jikan.moe/v4".to_string(),
            rate_limit: RateLimitConfig {
                requests_per_second: 3.0,
                requests_per_minute: 60,
            },
        }
    }
}

impl Default for CrosswalkConfig {
    fn default() -> Self {
        Self {
            source_url: "https://raw.githubusercontent.com/Fribb/anime-lists/refs/heads/master/anime-list-full.json"
                .to_string(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            referer: "https://animepahe.ru/".to_string(),
            script_timeout_ms: 5_000,
            loop_iteration_limit: 10_000_000,
            recursion_limit: 512,
            max_script_bytes: 256 * 1024,
            max_output_bytes: 64 * 1024,
            memory_limit_mb: 512,
            sandbox_runner: None,
        }
    }
}

impl CacheConfig {
    pub fn anime_page_ttl(&self) -> Duration {
        Duration::from_secs(self.anime_page_ttl_secs)
    }

    pub fn episodes_ttl(&self) -> Duration {
        Duration::from_secs(self.episodes_ttl_secs)
    }

    pub fn streams_ttl(&self) -> Duration {
        Duration::from_secs(self.streams_ttl_secs)
    }

    pub fn crosswalk_ttl(&self) -> Duration {
        Duration::from_secs(self.crosswalk_ttl_secs)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
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

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    /// Get the absolute path for the cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.cache.cache_dir)
    }

    fn resolve(&self, dir: &str) -> PathBuf {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}
