//! Core data model for SensorGate
//!
//! Everything the three gateway threads share or own lives here:
//!
//! - [`registry`]: generic ordered registry (arena of linked nodes with
//!   generational handles) used for connections and sensor metadata
//! - [`buffer`]: the dual-cursor shared buffer between the connection
//!   manager and its two consumers
//! - [`pipeline`]: buffer, termination flag and consumer signals bundled
//!   into one cloneable handle
//! - [`sensor`] and [`window`]: sensor map, running averages and alerts
//!
//! ```
//! use sensorgate_core::{Consumer, Pipeline, Reading};
//! use sensorgate_core::sensor::{SensorTable, Thresholds};
//!
//! let pipeline = Pipeline::new();
//! pipeline.publish(Reading::new(7, 21.0, 1));
//!
//! let mut table = SensorTable::<1>::from_map_str("3 7\n").unwrap();
//! let reading = pipeline.next_for(Consumer::Aggregator).unwrap();
//! let update = table.apply(&reading, &Thresholds::default()).unwrap();
//! assert_eq!(update.room_id, 3);
//! assert_eq!(update.average, 21.0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod constants;
pub mod errors;
pub mod pipeline;
pub mod reading;
pub mod registry;
pub mod sensor;
pub mod time;
pub mod window;

// Public API
pub use buffer::{Consumer, SharedBuffer};
pub use errors::{CoreError, CoreResult};
pub use pipeline::{ConsumerSignal, Pipeline, ShutdownFlag};
pub use reading::{Reading, RoomId, SensorId};
pub use registry::{ElementOps, NodeRef, OrdOps, Registry};
pub use time::{TimeSource, Timestamp};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
