//! Logging setup for the runtime and the binaries built on it
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the binary.
//!
//! # Examples
//!
//! ```no_run
//! use librx::logging::{LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::new(LogFormat::Json, "debug".to_string(), false);
//! config.init();
//! ```

use std::str::FromStr;

use crate::config::LoggingSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: '{}'. Valid options: text, json, pretty", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// # Arguments
    ///
    /// * `format` - Log output format
    /// * `level` - Minimum level or `EnvFilter` directive
    /// * `verbose` - Force debug level
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self { format, level, verbose }
    }

    /// Build from the `[logging]` section of the config file, letting
    /// `RX_LOG_FORMAT` and `RX_LOG_LEVEL` win when set.
    pub fn from_section(section: &LoggingSection) -> Self {
        let format = env_format()
            .or_else(|| section.format.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var("RX_LOG_LEVEL").unwrap_or_else(|_| section.level.clone());
        Self::new(format, level, false)
    }

    fn filter(&self) -> tracing_subscriber::EnvFilter {
        use tracing_subscriber::EnvFilter;

        let level = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }

    /// Install the global subscriber.
    ///
    /// Does nothing if one is already installed, so tests and embedding
    /// applications can call it freely.
    pub fn init(&self) {
        let filter = self.filter();

        // Logs go to stderr so stdout stays clean for command output
        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .try_init(),
        };

        if result.is_err() {
            tracing::debug!("logging subscriber already installed");
        }
    }
}

fn env_format() -> Option<LogFormat> {
    std::env::var("RX_LOG_FORMAT").ok().and_then(|s| s.parse().ok())
}

/// Initialize logging from `RX_LOG_FORMAT` and `RX_LOG_LEVEL`, defaulting to
/// text at info level.
pub fn init_default() {
    LoggingConfig::from_section(&LoggingSection::default()).init();
}
