//! Running-average aggregation worker

use std::io::Read;
use std::time::Duration;

use log::{debug, info, warn};

use sensorgate_connectors::wire::RecordReader;
use sensorgate_core::constants::time::CONSUMER_WAIT_SLICE_MS;
use sensorgate_core::sensor::{SensorTable, SensorUpdate, Thresholds};
use sensorgate_core::{Consumer, Pipeline, Reading};

use crate::errors::GatewayResult;

/// Counters kept by the aggregator
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregatorStats {
    /// Readings applied to a known sensor
    pub applied: u64,
    /// Readings dropped because their sensor is not in the map
    pub unknown: u64,
    /// Threshold alerts raised
    pub alerts: u64,
}

/// Final state of the aggregator after its thread exits
#[derive(Debug)]
pub struct AggregatorReport<const N: usize> {
    /// Sensor table with the final windows and timestamps
    pub table: SensorTable<N>,
    /// Counters at exit
    pub stats: AggregatorStats,
}

/// Applies readings to the sensor table and raises alerts
#[derive(Debug)]
pub struct Aggregator<const N: usize> {
    table: SensorTable<N>,
    thresholds: Thresholds,
    stats: AggregatorStats,
}

impl<const N: usize> Aggregator<N> {
    /// Aggregate into `table`, alerting outside `thresholds`
    pub fn new(table: SensorTable<N>, thresholds: Thresholds) -> Self {
        Self {
            table,
            thresholds,
            stats: AggregatorStats::default(),
        }
    }

    /// Apply one reading, logging unknown sensors and alerts
    pub fn apply(&mut self, reading: &Reading) -> Option<SensorUpdate> {
        let Some(update) = self.table.apply(reading, &self.thresholds) else {
            self.stats.unknown += 1;
            warn!(
                "Received sensor data with invalid sensor node {}",
                reading.sensor_id
            );
            return None;
        };
        self.stats.applied += 1;
        if let Some(alert) = update.alert {
            self.stats.alerts += 1;
            warn!("{alert}");
        }
        Some(update)
    }

    /// Apply every record of a binary record stream
    ///
    /// Offline counterpart of [`run`](Self::run), for replaying a capture.
    pub fn ingest_records<R: Read>(&mut self, reader: R) -> GatewayResult<usize> {
        let mut count = 0;
        for record in RecordReader::new(reader) {
            let reading = record?;
            self.apply(&reading);
            count += 1;
        }
        debug!("Ingested {count} records");
        Ok(count)
    }

    /// Current sensor table
    pub fn table(&self) -> &SensorTable<N> {
        &self.table
    }

    /// Counters so far
    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    /// Drain the aggregator cursor until termination
    pub fn run(mut self, pipeline: Pipeline) -> AggregatorReport<N> {
        let slice = Duration::from_millis(CONSUMER_WAIT_SLICE_MS);
        info!(
            "Aggregator started with {} sensors",
            self.table.total_sensors()
        );

        while pipeline.wait_for_work(Consumer::Aggregator, slice) {
            if let Some(reading) = pipeline.next_for(Consumer::Aggregator) {
                self.apply(&reading);
            }
        }

        info!(
            "Aggregator stopped: {} applied, {} unknown, {} alerts",
            self.stats.applied, self.stats.unknown, self.stats.alerts
        );
        AggregatorReport {
            table: self.table,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorgate_connectors::wire::write_records;

    fn aggregator() -> Aggregator<3> {
        let table = SensorTable::from_map_str("3 7\n1 15\n").unwrap();
        Aggregator::new(table, Thresholds { min: 18.0, max: 25.0 })
    }

    #[test]
    fn unknown_sensors_are_counted_and_dropped() {
        let mut agg = aggregator();
        assert!(agg.apply(&Reading::new(99, 20.0, 1)).is_none());
        assert_eq!(agg.stats().unknown, 1);
        assert_eq!(agg.stats().applied, 0);
    }

    #[test]
    fn alerts_are_counted() {
        let mut agg = aggregator();
        for ts in 0..3 {
            agg.apply(&Reading::new(15, 30.0, ts));
        }
        assert_eq!(agg.stats().alerts, 1);
        assert_eq!(agg.table().average_of(15), Some(30.0));
    }

    #[test]
    fn ingest_replays_a_record_stream() {
        let mut bytes = Vec::new();
        write_records(
            &mut bytes,
            &[
                Reading::new(7, 21.0, 10),
                Reading::new(7, 22.0, 11),
                Reading::new(7, 23.0, 12),
            ],
        )
        .unwrap();

        let mut agg = aggregator();
        assert_eq!(agg.ingest_records(bytes.as_slice()).unwrap(), 3);
        assert_eq!(agg.table().average_of(7), Some(22.0));
        assert_eq!(agg.table().last_modified_of(7), Some(12));
    }

    #[test]
    fn run_drains_then_stops_on_shutdown() {
        let pipeline = Pipeline::new();
        pipeline.publish(Reading::new(7, 21.0, 1));
        pipeline.publish(Reading::new(42, 0.0, 2));
        pipeline.request_shutdown();

        let report = aggregator().run(pipeline.clone());
        assert_eq!(report.stats.applied, 1);
        assert_eq!(report.stats.unknown, 1);
        assert_eq!(report.table.last_modified_of(7), Some(1));
        assert_eq!(pipeline.buffer().unread_count_for(Consumer::Aggregator), 0);
    }
}
