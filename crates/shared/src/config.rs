//! Configuration management for the annotation workbench.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
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

    /// Source and output directories for videos
    pub videos: VideosConfig,

    /// Duration-range to seconds-per-frame table
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Preprocessing worker settings
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    /// Label names offered to the editor
    #[serde(default)]
    pub labels: LabelsConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
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

/// Video directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideosConfig {
    /// Directory scanned for source videos (relative to data directory or absolute)
    pub source_dir: String,

    /// Directory receiving frames and label files (relative to data directory or absolute)
    pub output_dir: String,

    /// File extensions recognized as videos, without the leading dot
    pub extensions: Vec<String>,
}

/// Sampling rate configuration.
///
/// Loading never fails on this section. Rules that do not deserialize are
/// reported in `invalid` so the sampler can fall back to one frame per second.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SamplingConfig {
    /// Rules in declaration order; the first matching range wins
    pub rules: Vec<SpfRule>,

    /// Why each rejected rule was rejected
    #[serde(skip)]
    pub invalid: Vec<String>,
}

impl SamplingConfig {
    /// Whether every configured rule was read
    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    fn from_value(value: toml::Value) -> Self {
        let mut config = Self::default();

        let rules = match value {
            toml::Value::Table(mut table) => match table.remove("rules") {
                None => return config,
                Some(toml::Value::Array(rules)) => rules,
                Some(other) => {
                    config
                        .invalid
                        .push(format!("rules must be an array, found {}", other.type_str()));
                    return config;
                }
            },
            other => {
                config
                    .invalid
                    .push(format!("[sampling] must be a table, found {}", other.type_str()));
                return config;
            }
        };

        for (position, rule) in rules.into_iter().enumerate() {
            match rule.try_into::<SpfRule>() {
                Ok(rule) => config.rules.push(rule),
                Err(e) => config
                    .invalid
                    .push(format!("rule {}: {}", position + 1, e.to_string().trim())),
            }
        }

        config
    }
}

impl<'de> Deserialize<'de> for SamplingConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        toml::Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// A single duration range mapped to a sampling interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpfRule {
    /// Duration range in minutes, e.g. "0~10", "10~" or "~5"
    pub range: String,

    /// Seconds per sampled frame for videos in this range
    pub seconds: u32,
}

impl SpfRule {
    pub fn new(range: impl Into<String>, seconds: u32) -> Self {
        Self {
            range: range.into(),
            seconds,
        }
    }
}

/// Preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Upper bound on a single transcoder run in seconds (0 = unbounded)
    pub extraction_timeout_seconds: u64,

    /// Re-run interrupted preprocessing jobs at startup instead of failing them
    pub resume_interrupted: bool,

    /// Number of videos whose extra frames are kept in memory
    pub extras_cache_videos: usize,
}

/// Label configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelsConfig {
    /// Labels applied to a whole video
    #[serde(default)]
    pub video: Vec<String>,

    /// Labels applied to a clip
    #[serde(default)]
    pub clip: Vec<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            extraction_timeout_seconds: 3600,
            resume_interrupted: false,
            extras_cache_videos: 64,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7001".to_string(),
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
                path: "videos.db".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            videos: VideosConfig {
                source_dir: "videos".to_string(),
                output_dir: "output".to_string(),
                extensions: vec!["mp4".to_string(), "webm".to_string(), "ogg".to_string()],
            },
            // No rules: every video is sampled once per second
            sampling: SamplingConfig::default(),
            preprocess: PreprocessConfig::default(),
            labels: LabelsConfig::default(),
            server: ServerConfig::default(),
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

        for reason in &config.sampling.invalid {
            tracing::warn!(path = %path.display(), %reason, "Invalid sampling rule");
        }

        tracing::info!(
            path = %path.display(),
            rules = config.sampling.rules.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
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

    /// Get the path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the path for the database file
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database.path)
    }

    /// Get the path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    /// Get the directory scanned for source videos
    pub fn source_dir(&self) -> PathBuf {
        self.resolve(&self.videos.source_dir)
    }

    /// Get the directory receiving extracted frames and label files
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.videos.output_dir)
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
