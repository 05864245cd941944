//! Configuration types for tubarr

use crate::error::{Error, Result};
use crate::naming::{NameTemplate, NamingPreset};
use crate::types::Quality;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Environment variable naming the directory that holds `tubarr.db`
pub const ENV_CONFIG_PATH: &str = "TUBARR_CONFIG_PATH";

/// Environment variable overriding the default download root
pub const ENV_DOWNLOADS_PATH: &str = "TUBARR_DOWNLOADS_PATH";

/// Library layout settings (roots, quality, naming, sidecars)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root for channels that do not set their own (default: "./downloads")
    #[serde(default = "default_download_root")]
    pub default_download_root: PathBuf,

    /// Quality for channels that do not set their own (default: 1080p)
    #[serde(default)]
    pub default_quality: Quality,

    /// File naming
    #[serde(default)]
    pub naming: NamingConfig,

    /// Write tvshow/season/episode .nfo files (default: true)
    #[serde(default = "default_true")]
    pub write_sidecars: bool,

    /// Download channel posters and season artwork (default: true)
    #[serde(default = "default_true")]
    pub fetch_artwork: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            default_download_root: default_download_root(),
            default_quality: Quality::default(),
            naming: NamingConfig::default(),
            write_sidecars: true,
            fetch_artwork: true,
        }
    }
}

/// Episode file naming
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Naming preset (default: standard)
    #[serde(default)]
    pub preset: NamingPreset,

    /// Template used when `preset` is `custom`
    ///
    /// Supports `{channel}`, `{season}`, `{season:00}`, `{episode}`,
    /// `{episode:00}`, `{episode:000}`, `{title}`, `{id}` and `{date}`.
    #[serde(default)]
    pub custom_template: Option<String>,
}

impl NamingConfig {
    /// Resolve the configured template
    pub fn template(&self) -> Result<NameTemplate> {
        match self.preset {
            NamingPreset::Standard => Ok(NameTemplate::Standard),
            NamingPreset::Scene => Ok(NameTemplate::Scene),
            NamingPreset::Plex => Ok(NameTemplate::Plex),
            NamingPreset::Custom => match &self.custom_template {
                Some(template) if !template.trim().is_empty() => {
                    Ok(NameTemplate::Custom(template.clone()))
                }
                _ => Err(Error::Config {
                    message: "custom naming preset requires a non-empty custom_template"
                        .to_string(),
                    key: Some("custom_template".to_string()),
                }),
            },
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./tubarr.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Download execution settings (concurrency, retries, shutdown)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum concurrent fetches (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Retry policy for transient fetch failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// How long shutdown waits for running tasks (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            retry: RetryConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// External tool configuration (yt-dlp)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Extra arguments appended to every yt-dlp invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            extra_args: vec![],
        }
    }
}

/// Channel sync behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Download videos newly discovered on monitored channels (default: true)
    #[serde(default = "default_true")]
    pub download_new_videos: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_new_videos: true,
        }
    }
}

/// Main configuration for [`Tubarr`](crate::Tubarr)
///
/// Fields are organized into logical sub-configs:
/// - [`library`](LibraryConfig): roots, quality, naming, sidecars
/// - [`download`](DownloadConfig): concurrency, retries, shutdown
/// - [`tools`](ToolsConfig): yt-dlp discovery
/// - [`sync`](SyncConfig): what a channel sync dispatches
///
/// All sub-configs except `persistence` are flattened, so the serialized form
/// has no nesting for them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Library layout settings
    #[serde(flatten)]
    pub library: LibraryConfig,

    /// Download execution settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External tool settings
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Channel sync behavior
    #[serde(flatten)]
    pub sync: SyncConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Default download root
    pub fn download_root(&self) -> &PathBuf {
        &self.library.default_download_root
    }

    /// Apply `TUBARR_CONFIG_PATH` and `TUBARR_DOWNLOADS_PATH` from the environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_CONFIG_PATH).filter(|v| !v.is_empty()) {
            self.persistence.database_path = PathBuf::from(dir).join("tubarr.db");
        }
        if let Some(root) = lookup(ENV_DOWNLOADS_PATH).filter(|v| !v.is_empty()) {
            self.library.default_download_root = PathBuf::from(root);
        }
        self
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        if self.download.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be >= 1.0".to_string(),
                key: Some("backoff_multiplier".to_string()),
            });
        }
        let template = self.library.naming.template()?;
        template.validate()
    }
}

fn default_download_root() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./tubarr.db")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
