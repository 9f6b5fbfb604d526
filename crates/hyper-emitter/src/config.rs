//! # Emitter Configuration
//!
//! All timeouts and limits have defaults with override capability, from code,
//! from `HB_*` environment variables, or from a TOML file.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default delay between outbound connection attempts.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of outbound connection attempts before giving up.
pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Runtime parameters of a `HyperEmitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterConfig {
    /// Fixed delay between outbound connection attempts.
    pub reconnect_timeout: Duration,
    /// Attempts per disconnection episode before an outbound peer is dropped.
    pub max_connect_attempts: u32,
    /// Status notifications buffered per subscriber.
    pub status_capacity: usize,
    /// Decoded records buffered per stream reader.
    pub stream_buffer: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            status_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
            stream_buffer: 256,
        }
    }
}

impl EmitterConfig {
    /// Set the delay between connection attempts.
    #[must_use]
    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    /// Set the connection attempt budget (at least one).
    #[must_use]
    pub fn with_max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = attempts.max(1);
        self
    }

    /// Set the status channel capacity.
    #[must_use]
    pub fn with_status_capacity(mut self, capacity: usize) -> Self {
        self.status_capacity = capacity.max(1);
        self
    }

    /// Defaults overridden by environment variables:
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `HB_RECONNECT_TIMEOUT_MS` | `reconnect_timeout` |
    /// | `HB_MAX_CONNECT_ATTEMPTS` | `max_connect_attempts` |
    /// | `HB_STATUS_CAPACITY` | `status_capacity` |
    /// | `HB_STREAM_BUFFER` | `stream_buffer` |
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
            let value = value?;
            match value.trim().parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!(key, value = %value, "[emitter] Ignoring invalid configuration value");
                    None
                }
            }
        }

        let key = "HB_RECONNECT_TIMEOUT_MS";
        if let Some(ms) = parse::<u64>(key, lookup(key)) {
            self.reconnect_timeout = Duration::from_millis(ms);
        }
        let key = "HB_MAX_CONNECT_ATTEMPTS";
        if let Some(attempts) = parse::<u32>(key, lookup(key)) {
            self = self.with_max_connect_attempts(attempts);
        }
        let key = "HB_STATUS_CAPACITY";
        if let Some(capacity) = parse::<usize>(key, lookup(key)) {
            self = self.with_status_capacity(capacity);
        }
        let key = "HB_STREAM_BUFFER";
        if let Some(buffer) = parse::<usize>(key, lookup(key)) {
            self.stream_buffer = buffer.max(1);
        }
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Config File Format
    ///
    /// ```toml
    /// [peers]
    /// reconnect_timeout_ms = 1000
    /// max_connect_attempts = 10
    ///
    /// [channels]
    /// status_capacity = 1000
    /// stream_buffer = 256
    /// ```
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string. Missing keys keep defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = Self::default();

        let config = Self {
            reconnect_timeout: file
                .peers
                .reconnect_timeout_ms
                .map_or(defaults.reconnect_timeout, Duration::from_millis),
            max_connect_attempts: file
                .peers
                .max_connect_attempts
                .unwrap_or(defaults.max_connect_attempts),
            status_capacity: file
                .channels
                .status_capacity
                .unwrap_or(defaults.status_capacity),
            stream_buffer: file.channels.stream_buffer.unwrap_or(defaults.stream_buffer),
        };

        if config.max_connect_attempts == 0 {
            return Err(ConfigError::Invalid("max_connect_attempts must be at least 1"));
        }
        if config.status_capacity == 0 || config.stream_buffer == 0 {
            return Err(ConfigError::Invalid("channel sizes must be at least 1"));
        }
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    peers: PeersSection,
    #[serde(default)]
    channels: ChannelsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PeersSection {
    reconnect_timeout_ms: Option<u64>,
    max_connect_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelsSection {
    status_capacity: Option<usize>,
    stream_buffer: Option<usize>,
}

/// Errors that can occur during config loading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read config file {path}: {error}")]
    Io { path: String, error: String },

    /// TOML parse error.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(&'static str),
}
