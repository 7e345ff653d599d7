//! Sensor-Facing Connectors and Storage Backends
//!
//! ## Overview
//!
//! This crate holds everything in SensorGate that touches a socket or a file:
//!
//! - [`wire`]: the fixed-layout binary record sensors stream over TCP
//! - [`manager`]: the connection manager, which multiplexes the listener and
//!   every sensor link with `mio`, enforces idle timeouts and publishes
//!   decoded readings into the shared pipeline
//! - [`storage`]: the storage contract used by the persistence worker, with
//!   a durable JSON-lines backend and an in-memory backend
//!
//! ## Connection Lifecycle
//!
//! ```text
//!   accept ──▶ ACTIVE ──(no reading for idle_timeout)──▶ TIMED_OUT ──▶ removed
//!                │ ▲                                                  (socket
//!                └─┘ each complete record refreshes last_activity      closed)
//! ```
//!
//! The listener itself sits at position 0 of the connection registry and
//! never times out. Once it is the only entry for a full idle window the
//! manager stops.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use sensorgate_connectors::manager::{ConnectionManager, ManagerConfig};
//! use sensorgate_core::Pipeline;
//!
//! let pipeline = Pipeline::new();
//! let config = ManagerConfig {
//!     idle_timeout: Duration::from_secs(5),
//!     capture_path: None,
//! };
//! let manager = ConnectionManager::bind("0.0.0.0:1234".parse()?, pipeline, config)?;
//! let stats = manager.run()?;
//! println!("accepted {} sensors", stats.accepted);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]

pub mod manager;
pub mod storage;
pub mod wire;

use std::net::SocketAddr;

use sensorgate_core::CoreError;
use thiserror::Error;

pub use manager::{ConnectionManager, ManagerConfig};
pub use storage::{RowFilter, StorageBackend, StorageConnection, StorageError, StoredRow};

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Connector errors
///
/// `Bind`, `Poll` and `Accept` are fatal for the connection manager.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        /// Requested listen address
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Readiness wait failed: {0}")]
    Poll(#[source] std::io::Error),

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Connection manager statistics, reported when the manager exits
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Sensor connections accepted
    pub accepted: u64,
    /// Sensor connections closed after their idle timeout
    pub timed_out: u64,
    /// Sensor connections still open at shutdown
    pub closed_at_shutdown: u64,
    /// Complete records decoded and published
    pub records: u64,
    /// Trailing partial records discarded at end of stream
    pub partial_dropped: u64,
    /// Bytes received from all sensors
    pub bytes_received: u64,
    /// Most sensor connections open at once
    pub peak_connections: usize,
}
