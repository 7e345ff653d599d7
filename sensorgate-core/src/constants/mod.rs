//! Constants for SensorGate
//!
//! Centralized defaults used across the gateway. Runtime-tunable values are
//! only defaults here; `GatewayConfig` overrides them. The window length is
//! the exception: it sizes the per-sensor window at compile time.
//!
//! ## Organization
//!
//! - **Aggregation**: window length and alert thresholds
//! - **Network**: wire record layout and idle timeout
//! - **Storage**: reconnect policy
//! - **Time**: worker wait slices

/// Running-average window and alert thresholds.
pub mod aggregation;

/// Wire record layout and connection timing.
pub mod network;

/// Storage reconnect policy.
pub mod storage;

/// Worker wait slices.
pub mod time;

pub use aggregation::{DEFAULT_MAX_TEMP, DEFAULT_MIN_TEMP, RUN_AVG_LENGTH};
pub use network::{DEFAULT_IDLE_TIMEOUT_SECS, RECORD_SIZE};
pub use storage::{DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BACKOFF_MS};
pub use time::CONSUMER_WAIT_SLICE_MS;
