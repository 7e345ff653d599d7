//! Gateway Configuration
//!
//! ## Overview
//!
//! Runtime settings live in a TOML file with four sections. Every field has
//! a default, so an empty file (or no file at all) yields a working gateway:
//!
//! ```toml
//! [network]
//! idle_timeout_secs = 5
//!
//! [aggregation]
//! sensor_map = "room_sensor.map"
//! min_temp = 18.0
//! max_temp = 25.0
//!
//! [storage]
//! path = "sensor_db.jsonl"
//! reset_on_connect = true
//! reconnect_attempts = 3
//! reconnect_backoff_ms = 5000
//!
//! [logging]
//! path = "gateway.log"
//! level = "info"
//! capture_path = "sensor_data_recv"
//! ```
//!
//! ## Resolution Order
//!
//! 1. The file passed with `--config` (errors are fatal)
//! 2. `config/sensorgate.toml` or `../config/sensorgate.toml` when present
//!    (errors fall back to defaults with a warning)
//! 3. Built-in defaults
//!
//! The listening port is not part of the file; it is the binary's positional
//! argument.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;

use sensorgate_core::constants::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_TEMP, DEFAULT_MIN_TEMP, DEFAULT_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_BACKOFF_MS,
};
use sensorgate_core::sensor::Thresholds;

use crate::errors::{GatewayError, GatewayResult};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub network: NetworkConfig,
    pub aggregation: AggregationConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Seconds of silence before a sensor link is closed
    pub idle_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl NetworkConfig {
    /// Idle timeout as a [`Duration`]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationConfig {
    /// `room_id sensor_id` map file
    pub sensor_map: PathBuf,
    pub min_temp: f64,
    pub max_temp: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            sensor_map: PathBuf::from("room_sensor.map"),
            min_temp: DEFAULT_MIN_TEMP,
            max_temp: DEFAULT_MAX_TEMP,
        }
    }
}

impl AggregationConfig {
    /// Alert thresholds for the aggregator
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min: self.min_temp,
            max: self.max_temp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// JSON-lines table file
    pub path: PathBuf,
    /// Drop existing rows on the first connect
    pub reset_on_connect: bool,
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sensor_db.jsonl"),
            reset_on_connect: true,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
        }
    }
}

impl StorageConfig {
    /// Reconnect backoff as a [`Duration`]
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Gateway log file
    pub path: PathBuf,
    /// `error`, `warn`, `info`, `debug`, `trace` or `off`
    pub level: String,
    /// Optional text mirror of every received record
    pub capture_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gateway.log"),
            level: "info".to_string(),
            capture_path: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed log level
    pub fn level_filter(&self) -> GatewayResult<LevelFilter> {
        self.level
            .parse()
            .map_err(|_| GatewayError::InvalidConfig(format!("unknown log level {:?}", self.level)))
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Loaded from this file
    File(PathBuf),
    /// No file found
    Defaults,
    /// A default-location file existed but failed to load
    FallbackAfterError { path: PathBuf, error: String },
}

impl GatewayConfig {
    /// Default locations probed when no path is given
    pub const DEFAULT_PATHS: [&'static str; 2] = ["config/sensorgate.toml", "../config/sensorgate.toml"];

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| GatewayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| GatewayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the configuration for the binary
    ///
    /// The logger is not installed yet at this point, so the caller reports
    /// the returned [`ConfigSource`] once it is.
    pub fn resolve(explicit: Option<&Path>) -> GatewayResult<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, ConfigSource::File(path.to_path_buf())));
        }

        for candidate in Self::DEFAULT_PATHS.iter().map(PathBuf::from) {
            if !candidate.exists() {
                continue;
            }
            return Ok(match Self::load(&candidate) {
                Ok(config) => (config, ConfigSource::File(candidate)),
                Err(e) => (
                    Self::default(),
                    ConfigSource::FallbackAfterError {
                        path: candidate,
                        error: e.to_string(),
                    },
                ),
            });
        }
        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> GatewayResult<()> {
        if self.network.idle_timeout_secs == 0 {
            return Err(GatewayError::InvalidConfig(
                "network.idle_timeout_secs must be at least 1".into(),
            ));
        }
        if self.aggregation.min_temp > self.aggregation.max_temp {
            return Err(GatewayError::InvalidConfig(format!(
                "aggregation.min_temp ({}) exceeds max_temp ({})",
                self.aggregation.min_temp, self.aggregation.max_temp
            )));
        }
        self.logging.level_filter()?;
        Ok(())
    }
}
