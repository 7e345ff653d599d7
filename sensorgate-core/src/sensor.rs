//! Sensor Metadata Table
//!
//! ## Overview
//!
//! The sensor table maps every known sensor to its room and keeps one
//! [`RunningWindow`] per sensor. It is loaded once from the sensor map, then
//! updated in place for every reading the aggregation worker drains. Entries
//! are never removed during normal operation.
//!
//! ## Sensor Map Format
//!
//! Plain text, one `room_id sensor_id` pair per line, whitespace separated.
//! Blank lines are ignored. Anything else is a [`CoreError::MalformedMapLine`]
//! carrying the 1-based line number:
//!
//! ```text
//! 1 15
//! 1 21
//! 2 37
//! ```
//!
//! ## Thresholds
//!
//! Once a sensor's window is full, its average is compared against the
//! configured [`Thresholds`]. An average below `min` yields
//! [`Alert::TooCold`], above `max` yields [`Alert::TooHot`]. Before the window
//! fills the average reads as zero and no alert is raised.

use core::cmp::Ordering;
use core::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::constants::aggregation::{DEFAULT_MAX_TEMP, DEFAULT_MIN_TEMP};
use crate::errors::{CoreError, CoreResult};
use crate::reading::{Reading, RoomId, SensorId};
use crate::registry::{ElementOps, Registry};
use crate::time::Timestamp;
use crate::window::RunningWindow;

/// Per-sensor state
#[derive(Debug, Clone)]
pub struct SensorMeta<const N: usize> {
    /// Sensor identifier from the map
    pub sensor_id: SensorId,
    /// Room the sensor is mounted in
    pub room_id: RoomId,
    /// Most recent values
    pub window: RunningWindow<N>,
    /// Timestamp of the last applied reading, 0 before the first one
    pub last_modified: Timestamp,
}

impl<const N: usize> SensorMeta<N> {
    /// Fresh metadata with an empty window
    pub fn new(sensor_id: SensorId, room_id: RoomId) -> Self {
        Self {
            sensor_id,
            room_id,
            window: RunningWindow::new(),
            last_modified: 0,
        }
    }

    /// Running average, zero until the window is full
    pub fn running_avg(&self) -> f64 {
        self.window.average().unwrap_or(0.0)
    }
}

/// Registry capabilities for sensor metadata: ordered by sensor id
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorOps;

impl<const N: usize> ElementOps<SensorMeta<N>> for SensorOps {
    fn copy(&self, element: &SensorMeta<N>) -> Option<SensorMeta<N>> {
        Some(element.clone())
    }

    fn compare(&self, a: &SensorMeta<N>, b: &SensorMeta<N>) -> Ordering {
        a.sensor_id.cmp(&b.sensor_id)
    }
}

/// Alert thresholds on the running average
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Averages strictly below raise [`Alert::TooCold`]
    pub min: f64,
    /// Averages strictly above raise [`Alert::TooHot`]
    pub max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_TEMP,
            max: DEFAULT_MAX_TEMP,
        }
    }
}

impl Thresholds {
    /// Classify an average against the thresholds
    pub fn check(&self, sensor_id: SensorId, room_id: RoomId, average: f64) -> Option<Alert> {
        if average < self.min {
            Some(Alert::TooCold {
                sensor_id,
                room_id,
                average,
            })
        } else if average > self.max {
            Some(Alert::TooHot {
                sensor_id,
                room_id,
                average,
            })
        } else {
            None
        }
    }
}

/// Threshold violation of a running average
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alert {
    /// Average fell below the minimum
    TooCold {
        sensor_id: SensorId,
        room_id: RoomId,
        average: f64,
    },
    /// Average rose above the maximum
    TooHot {
        sensor_id: SensorId,
        room_id: RoomId,
        average: f64,
    },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::TooCold {
                sensor_id,
                room_id,
                average,
            } => write!(
                f,
                "The sensor node with {sensor_id} in room {room_id} reports it's too cold (running avg temperature = {average:.2})"
            ),
            Alert::TooHot {
                sensor_id,
                room_id,
                average,
            } => write!(
                f,
                "The sensor node with {sensor_id} in room {room_id} reports it's too hot (running avg temperature = {average:.2})"
            ),
        }
    }
}

/// Outcome of applying one reading to a known sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorUpdate {
    /// Sensor the reading belonged to
    pub sensor_id: SensorId,
    /// Room of that sensor
    pub room_id: RoomId,
    /// Running average after the update, zero until the window is full
    pub average: f64,
    /// Threshold violation, only evaluated on a full window
    pub alert: Option<Alert>,
}

/// All known sensors, ordered by sensor id
pub struct SensorTable<const N: usize> {
    sensors: Registry<SensorMeta<N>, SensorOps>,
}

impl<const N: usize> Default for SensorTable<N> {
    fn default() -> Self {
        Self {
            sensors: Registry::new(SensorOps),
        }
    }
}

impl<const N: usize> fmt::Debug for SensorTable<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorTable")
            .field("sensors", &self.sensors.len())
            .field("window", &N)
            .finish()
    }
}

impl<const N: usize> SensorTable<N> {
    /// Load the sensor map from a file
    pub fn from_map_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let file = File::open(path)?;
        Self::from_map_reader(BufReader::new(file))
    }

    /// Load the sensor map from text
    pub fn from_map_str(map: &str) -> CoreResult<Self> {
        Self::from_map_reader(map.as_bytes())
    }

    /// Load the sensor map from any buffered reader
    pub fn from_map_reader<R: BufRead>(reader: R) -> CoreResult<Self> {
        let mut table = Self::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let number = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (room_id, sensor_id) = parse_map_line(trimmed).ok_or_else(|| {
                CoreError::MalformedMapLine {
                    line: number,
                    content: line.clone(),
                }
            })?;
            table.register(sensor_id, room_id, number)?;
        }
        log::debug!("Loaded {} sensors from map", table.total_sensors());
        Ok(table)
    }

    fn register(&mut self, sensor_id: SensorId, room_id: RoomId, line: usize) -> CoreResult<()> {
        let meta = SensorMeta::new(sensor_id, room_id);
        if self.sensors.reference_of_element(&meta).is_some() {
            return Err(CoreError::DuplicateSensor { sensor_id, line });
        }
        self.sensors.insert_sorted(meta);
        Ok(())
    }

    /// Apply a reading to its sensor
    ///
    /// Returns `None` for a sensor id absent from the map; the caller decides
    /// how to report it.
    pub fn apply(&mut self, reading: &Reading, thresholds: &Thresholds) -> Option<SensorUpdate> {
        let meta = self
            .sensors
            .find_mut(|meta| meta.sensor_id == reading.sensor_id)?;
        meta.window.push(reading.value);
        meta.last_modified = reading.timestamp;

        let alert = meta
            .window
            .average()
            .and_then(|average| thresholds.check(meta.sensor_id, meta.room_id, average));

        Some(SensorUpdate {
            sensor_id: meta.sensor_id,
            room_id: meta.room_id,
            average: meta.running_avg(),
            alert,
        })
    }

    /// Metadata of one sensor
    pub fn get(&self, sensor_id: SensorId) -> Option<&SensorMeta<N>> {
        self.sensors.iter().find(|meta| meta.sensor_id == sensor_id)
    }

    /// Room of a sensor
    pub fn room_of(&self, sensor_id: SensorId) -> Option<RoomId> {
        self.get(sensor_id).map(|meta| meta.room_id)
    }

    /// Running average of a sensor, zero until its window is full
    pub fn average_of(&self, sensor_id: SensorId) -> Option<f64> {
        self.get(sensor_id).map(SensorMeta::running_avg)
    }

    /// Timestamp of the last reading applied to a sensor
    pub fn last_modified_of(&self, sensor_id: SensorId) -> Option<Timestamp> {
        self.get(sensor_id).map(|meta| meta.last_modified)
    }

    /// Number of sensors in the map
    pub fn total_sensors(&self) -> usize {
        self.sensors.len()
    }

    /// Sensors in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &SensorMeta<N>> {
        self.sensors.iter()
    }
}

fn parse_map_line(line: &str) -> Option<(RoomId, SensorId)> {
    let mut fields = line.split_whitespace();
    let room = fields.next()?.parse().ok()?;
    let sensor = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((room, sensor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MAP: &str = "1 15\n1 21\n\n2 37\n3 7\n";

    #[test]
    fn parses_map_in_sensor_order() {
        let table = SensorTable::<5>::from_map_str(MAP).unwrap();
        assert_eq!(table.total_sensors(), 4);
        let ids: Vec<SensorId> = table.iter().map(|m| m.sensor_id).collect();
        assert_eq!(ids, vec![7, 15, 21, 37]);
        assert_eq!(table.room_of(37), Some(2));
        assert_eq!(table.room_of(99), None);
    }

    #[test]
    fn rejects_malformed_and_duplicate_lines() {
        let err = SensorTable::<5>::from_map_str("1 15\n1 15 4\n").unwrap_err();
        assert!(matches!(err, CoreError::MalformedMapLine { line: 2, .. }));

        let err = SensorTable::<5>::from_map_str("1 15\n2 15\n").unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateSensor {
                sensor_id: 15,
                line: 2
            }
        ));
    }

    #[test]
    fn loads_map_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MAP.as_bytes()).unwrap();
        let table = SensorTable::<3>::from_map_file(file.path()).unwrap();
        assert_eq!(table.total_sensors(), 4);

        let missing = SensorTable::<3>::from_map_file("/nonexistent/room_sensor.map");
        assert!(matches!(missing, Err(CoreError::MapIo(_))));
    }

    #[test]
    fn window_of_three_averages_after_third_reading() {
        let mut table = SensorTable::<3>::from_map_str("3 7\n").unwrap();
        let thresholds = Thresholds {
            min: 18.0,
            max: 25.0,
        };

        for (i, value) in [21.0, 22.0].into_iter().enumerate() {
            let update = table
                .apply(&Reading::new(7, value, 100 + i as i64), &thresholds)
                .unwrap();
            assert_eq!(update.average, 0.0);
            assert_eq!(update.alert, None);
        }
        let update = table
            .apply(&Reading::new(7, 23.0, 102), &thresholds)
            .unwrap();
        assert_eq!(update.average, 22.0);
        assert_eq!(update.alert, None);
        assert_eq!(table.last_modified_of(7), Some(102));
    }

    #[test]
    fn alerts_fire_on_full_window_only() {
        let mut table = SensorTable::<2>::from_map_str("1 4\n").unwrap();
        let thresholds = Thresholds::default();

        let first = table.apply(&Reading::new(4, 30.0, 1), &thresholds).unwrap();
        assert_eq!(first.alert, None);
        let second = table.apply(&Reading::new(4, 32.0, 2), &thresholds).unwrap();
        assert!(matches!(second.alert, Some(Alert::TooHot { sensor_id: 4, .. })));

        table.apply(&Reading::new(4, 5.0, 3), &thresholds);
        let cold = table.apply(&Reading::new(4, 5.0, 4), &thresholds).unwrap();
        assert!(matches!(cold.alert, Some(Alert::TooCold { room_id: 1, .. })));
        assert!(cold.alert.unwrap().to_string().contains("too cold"));
    }

    #[test]
    fn unknown_sensor_is_not_applied() {
        let mut table = SensorTable::<2>::from_map_str(MAP).unwrap();
        assert!(table
            .apply(&Reading::new(999, 1.0, 1), &Thresholds::default())
            .is_none());
        assert_eq!(table.average_of(999), None);
    }
}
