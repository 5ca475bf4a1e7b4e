//! Configuration management for mshell
//!
//! Configuration is read from a TOML file (default `~/.mshell/config.toml`)
//! and then overridden by command-line arguments.
//!
//! Precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Shell behaviour
    #[serde(default)]
    pub shell: ShellConfig,

    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named shard endpoints for fan-out mode
    #[serde(default)]
    pub shards: Vec<ShardConfig>,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Default connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Server selection timeout in seconds
    #[serde(default = "default_server_selection_timeout")]
    pub server_selection_timeout_secs: u64,
}

/// Shell behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Database selected at startup
    #[serde(default = "default_database")]
    pub default_database: String,

    /// Emit query diagnostics before counting
    #[serde(default)]
    pub verbose: bool,
}

/// Display and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Documents pulled per cursor batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Enable colored output
    #[serde(default = "default_color_output")]
    pub color_output: bool,

    /// Show execution time
    #[serde(default)]
    pub show_timing: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A named shard endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub name: String,
    pub uri: String,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_server_selection_timeout() -> u64 {
    10
}

fn default_database() -> String {
    "test".to_string()
}

fn default_batch_size() -> usize {
    20
}

fn default_color_output() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            timeout_secs: default_timeout(),
            server_selection_timeout_secs: default_server_selection_timeout(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_database: default_database(),
            verbose: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            color_output: default_color_output(),
            show_timing: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::InvalidFormat(format!("{}: {e}", path.display())),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path, or from the default path
    /// when it exists, or fall back to defaults.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mshell")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.display.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "display.batch_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for shard in &self.shards {
            if shard.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "shards.name".to_string(),
                    value: String::new(),
                }
                .into());
            }
            if !seen.insert(shard.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "shards.name".to_string(),
                    value: shard.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Serialize the effective configuration
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
