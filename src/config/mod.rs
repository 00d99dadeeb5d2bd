//! Configuration handling for Pulse
//!
//! Configuration lives in `<config_dir>/pulse.toml` by default. A path given
//! on the command line may also point at a `.yaml`/`.yml` or `.json` file;
//! the format follows the extension.
//!
//! | Section     | Consumer                                   |
//! |-------------|--------------------------------------------|
//! | `[control]` | [`PluginManager`](crate::control::PluginManager) |
//! | `[tribe]`   | Cluster membership                         |
//! | `[log]`     | [`logging::dispatch`](crate::logging::dispatch) |

mod tribe;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tribe::TribeConfig;

/// File name looked up in the user's config directory
pub const CONFIG_FILE_NAME: &str = "pulse.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("{message} (while parsing '{section}::{key}')")]
    Field {
        section: String,
        key: String,
        message: String,
    },
}

/// Plugin control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// How long a plugin has to answer the handshake
    pub handshake_timeout_ms: u64,

    /// How long a plugin has to exit after being asked to stop
    pub stop_timeout_ms: u64,

    /// Upper bound on the serialized per-plugin config
    pub max_plugin_config_bytes: usize,

    /// Directory scanned for plugins at startup
    pub auto_discover_path: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 3000,
            stop_timeout_ms: 2000,
            max_plugin_config_bytes: 64 * 1024,
            auto_discover_path: None,
        }
    }
}

impl ControlConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "pulse=debug")
    pub level: String,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Yaml,
    Json,
}

impl FileFormat {
    /// Picks the format from a file extension, defaulting to TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub control: ControlConfig,
    pub tribe: TribeConfig,
    pub log: LogConfig,
}

impl Config {
    /// Returns the default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "pulse", "pulse")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from `path`, or from the default location
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                Self::from_file(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reads and parses a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        Self::parse(&content, FileFormat::from_path(path))
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Parses configuration text in the given format
    pub fn parse(content: &str, format: FileFormat) -> Result<Self, ConfigError> {
        match format {
            FileFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
            FileFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            FileFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
        }
    }

    /// Checks values serde cannot rule out on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "control.handshake_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.control.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "control.stop_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.log.level.trim().is_empty() {
            return Err(ConfigError::Invalid("log.level must not be empty".to_string()));
        }
        Ok(())
    }

    /// Renders the configuration as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
