//! Runtime configuration
//!
//! Read from `$RX_CONFIG` or `<config dir>/rx/config.toml`. Every section and
//! field is optional; a missing file yields the defaults.
//!
//! ```toml
//! [store]
//! debounce_interval_ms = 50
//!
//! [bus]
//! default_wait_ms = 0
//!
//! [logging]
//! format = "json"
//! level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::logging::LogFormat;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Coalescing window for writes; 0 disables debouncing
    pub debounce_interval_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Delay applied to emits that don't specify their own
    pub default_wait_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub format: String,
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Text.to_string(),
            level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn debounce_interval(&self) -> Option<Duration> {
        (self.debounce_interval_ms > 0).then(|| Duration::from_millis(self.debounce_interval_ms))
    }
}

impl BusConfig {
    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }
}

impl LoggingSection {
    /// Parsed log format
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the bad value.
    pub fn log_format(&self) -> Result<LogFormat> {
        self.format
            .parse()
            .map_err(|e: String| ConfigError::InvalidValue(format!("logging.format: {}", e)).into())
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists there
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.logging.log_format()?;
        Ok(config)
    }
}

/// Resolve the configuration file path following XDG Base Directory conventions
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("RX_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir =
        dirs::config_dir().ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("rx").join("config.toml"))
}
