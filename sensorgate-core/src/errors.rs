//! Error Types for the SensorGate Core
//!
//! ## Error Categories
//!
//! The core crate only fails in a handful of places. Most operations on the
//! registry and the shared buffer follow a sentinel contract and return
//! `Option` instead of an error (see [`crate::registry`]).
//!
//! ### Sensor Map Problems
//! - `MapIo`: the sensor map file could not be opened or read
//! - `MalformedMapLine`: a line did not contain `room_id sensor_id`
//! - `DuplicateSensor`: the same sensor id appears twice in the map
//!
//! ### Wire Problems
//! - `ShortRecord`: a record ended before all three fields were present
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use sensorgate_core::{CoreError, sensor::SensorTable};
//!
//! match SensorTable::<5>::from_map_str("3 7\n1 x\n") {
//!     Ok(table) => assert_eq!(table.total_sensors(), 1),
//!     Err(CoreError::MalformedMapLine { line, .. }) => assert_eq!(line, 2),
//!     Err(other) => panic!("unexpected: {other}"),
//! }
//! ```

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the core data model
#[derive(Error, Debug)]
pub enum CoreError {
    /// Sensor map could not be read
    #[error("Failed to read sensor map: {0}")]
    MapIo(#[from] std::io::Error),

    /// A line of the sensor map is not `room_id sensor_id`
    #[error("Malformed sensor map line {line}: {content:?}")]
    MalformedMapLine {
        /// 1-based line number
        line: usize,
        /// Offending line content
        content: String,
    },

    /// A sensor id was mapped twice
    #[error("Sensor {sensor_id} mapped twice (line {line})")]
    DuplicateSensor {
        /// Repeated sensor id
        sensor_id: u16,
        /// 1-based line number of the second mapping
        line: usize,
    },

    /// A wire record ended early
    #[error("Short record: need {required} bytes, have {available}")]
    ShortRecord {
        /// Bytes needed for a full record
        required: usize,
        /// Bytes actually present
        available: usize,
    },
}
