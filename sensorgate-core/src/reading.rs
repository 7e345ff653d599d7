//! Sensor readings as they travel through the gateway
//!
//! A [`Reading`] is produced once by the connection manager and never mutated
//! afterwards. Both consumers receive copies, so the type is `Copy`.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Identifier of a physical sensor node
pub type SensorId = u16;

/// Identifier of the room a sensor is mounted in
pub type RoomId = u16;

/// One sensor measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Sensor that produced the value
    pub sensor_id: SensorId,
    /// Measured value (temperature in the reference deployment)
    pub value: f64,
    /// Epoch seconds at which the sensor sampled the value
    pub timestamp: Timestamp,
}

impl Reading {
    /// Create a new reading
    pub const fn new(sensor_id: SensorId, value: f64, timestamp: Timestamp) -> Self {
        Self { sensor_id, value, timestamp }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sensor id = {} - value = {} - timestamp = {}",
            self.sensor_id, self.value, self.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_receive_log() {
        let reading = Reading::new(15, 21.5, 1_700_000_000);
        assert_eq!(
            reading.to_string(),
            "sensor id = 15 - value = 21.5 - timestamp = 1700000000"
        );
    }
}
