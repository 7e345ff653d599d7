//! Network Constants
//!
//! A wire record is three little-endian fields with no framing:
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────────┐
//! │ id: u16  │ value: f64   │ timestamp: i64   │
//! │ 2 bytes  │ 8 bytes      │ 8 bytes          │
//! └──────────┴──────────────┴──────────────────┘
//! ```

/// Size of the sensor id field.
pub const SENSOR_ID_SIZE: usize = 2;

/// Size of the value field.
pub const VALUE_SIZE: usize = 8;

/// Size of the timestamp field.
pub const TIMESTAMP_SIZE: usize = 8;

/// Size of one wire record.
pub const RECORD_SIZE: usize = SENSOR_ID_SIZE + VALUE_SIZE + TIMESTAMP_SIZE;

/// Default idle timeout of a sensor connection (seconds).
///
/// Also the grace window the listener waits once it is the only
/// registered connection.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5;

/// Scratch buffer size for a single socket read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Socket reads granted to one sensor link per loop iteration.
///
/// A link that still has data after its budget is served again on the next
/// iteration, so a sensor streaming faster than the manager reads cannot
/// starve the other links, the sweep or the shutdown check.
pub const READS_PER_WAKE: usize = 4;

/// Readiness events processed per poll iteration.
pub const EVENTS_CAPACITY: usize = 128;
