//! Gateway Error Handling
//!
//! ## Error Mapping Strategy
//!
//! ```text
//! CoreError       (sensor map)        → GatewayError::SensorMap
//! ConnectorError  (bind/poll/accept)  → GatewayError::Connector
//! StorageError    (single operation)  → GatewayError::Storage
//! reconnect budget exhausted          → GatewayError::StorageExhausted
//! worker panic                        → GatewayError::WorkerPanicked
//! ```
//!
//! Every variant is fatal for the process: the binary reports it on stderr
//! and exits non-zero after the remaining threads have been joined.

use std::path::PathBuf;

use sensorgate_connectors::{ConnectorError, StorageError};
use sensorgate_core::CoreError;
use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Fatal gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration file could not be read
    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`crate::config::GatewayConfig`]
    #[error("Failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sensor map could not be loaded
    #[error("Sensor map error: {0}")]
    SensorMap(#[from] CoreError),

    /// Listener, readiness wait or accept failed
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// A storage operation failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Every reconnect attempt to storage failed
    #[error("Unable to connect to storage after {attempts} attempts: {last}")]
    StorageExhausted {
        attempts: u32,
        #[source]
        last: StorageError,
    },

    /// Log file could not be opened
    #[error("Failed to open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A global logger was already installed
    #[error("Logger already installed: {0}")]
    LoggerInstalled(#[from] log::SetLoggerError),

    /// Ctrl-C handler could not be installed
    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// A worker thread could not be spawned
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked
    #[error("The {0} thread panicked")]
    WorkerPanicked(&'static str),
}
