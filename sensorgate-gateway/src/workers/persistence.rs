//! Persistence Worker
//!
//! Drains the store cursor into a [`StorageBackend`]. A failed insert is
//! treated as a lost connection: the reading is kept, the worker reconnects
//! with a fixed backoff, and the same reading is retried first so rows land
//! in buffer order. Reconnects never reset the table.
//!
//! When the reconnect budget runs out the worker requests termination for
//! the whole gateway and returns [`GatewayError::StorageExhausted`].

use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use sensorgate_connectors::{RowFilter, StorageBackend, StorageConnection, StorageError};
use sensorgate_core::constants::time::CONSUMER_WAIT_SLICE_MS;
use sensorgate_core::{Consumer, Pipeline, Reading};

use crate::config::StorageConfig;
use crate::errors::{GatewayError, GatewayResult};

/// Connection policy for the worker
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceSettings {
    /// Drop existing rows on the first connect
    pub reset_on_connect: bool,
    /// Reconnect attempts before giving up
    pub reconnect_attempts: u32,
    /// Pause before each reconnect attempt
    pub reconnect_backoff: Duration,
}

impl From<&StorageConfig> for PersistenceSettings {
    fn from(config: &StorageConfig) -> Self {
        Self {
            reset_on_connect: config.reset_on_connect,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_backoff: config.reconnect_backoff(),
        }
    }
}

/// Counters reported when the worker exits normally
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistenceReport {
    /// Readings written to storage
    pub inserted: u64,
    /// Successful reconnects after a lost connection
    pub reconnects: u32,
    /// Rows in the table when the worker stopped
    pub rows_at_shutdown: usize,
}

/// Writes the store cursor into a storage backend
#[derive(Debug)]
pub struct PersistenceWorker<B: StorageBackend> {
    backend: B,
    settings: PersistenceSettings,
    pending: Option<Reading>,
    report: PersistenceReport,
}

impl<B: StorageBackend> PersistenceWorker<B> {
    /// Worker writing into `backend` under `settings`
    pub fn new(backend: B, settings: PersistenceSettings) -> Self {
        Self {
            backend,
            settings,
            pending: None,
            report: PersistenceReport::default(),
        }
    }

    /// Drain the store cursor until termination
    pub fn run(mut self, pipeline: Pipeline) -> GatewayResult<PersistenceReport> {
        let slice = Duration::from_millis(CONSUMER_WAIT_SLICE_MS);
        let reset = self.settings.reset_on_connect;

        let mut conn = match self.backend.connect(reset) {
            Ok(conn) => {
                info!("Connection to storage established ({})", self.backend.describe());
                conn
            }
            Err(e) => {
                warn!("Unable to connect to storage: {e}");
                self.reconnect(&pipeline, reset)?
            }
        };

        loop {
            if self.pending.is_none() {
                if !pipeline.wait_for_work(Consumer::Store, slice) {
                    break;
                }
                self.pending = pipeline.next_for(Consumer::Store);
            }
            let Some(reading) = self.pending else {
                continue;
            };

            match conn.insert(&reading) {
                Ok(id) => {
                    debug!("Stored row {id}: {reading}");
                    self.report.inserted += 1;
                    self.pending = None;
                }
                Err(e) => {
                    warn!("Connection to storage lost: {e}");
                    if let Err(e) = conn.disconnect() {
                        debug!("Disconnect after failure: {e}");
                    }
                    conn = self.reconnect(&pipeline, false)?;
                    self.report.reconnects += 1;
                }
            }
        }

        self.report.rows_at_shutdown = dump_rows(&mut conn);
        if let Err(e) = conn.disconnect() {
            warn!("Failed to disconnect from storage: {e}");
        }
        info!(
            "Persistence stopped: {} inserted, {} reconnects",
            self.report.inserted, self.report.reconnects
        );
        Ok(self.report)
    }

    fn reconnect(&self, pipeline: &Pipeline, reset: bool) -> GatewayResult<B::Connection> {
        let attempts = self.settings.reconnect_attempts.max(1);
        let mut last = StorageError::Unavailable("no attempt made".into());

        for attempt in 1..=attempts {
            thread::sleep(self.settings.reconnect_backoff);
            match self.backend.connect(reset) {
                Ok(conn) => {
                    info!("Connection to storage established ({})", self.backend.describe());
                    return Ok(conn);
                }
                Err(e) => {
                    warn!("Reconnect attempt {attempt}/{attempts} failed: {e}");
                    last = e;
                }
            }
        }

        error!("Unable to connect to storage");
        pipeline.request_shutdown();
        Err(GatewayError::StorageExhausted { attempts, last })
    }
}

fn dump_rows<C: StorageConnection>(conn: &mut C) -> usize {
    let result = conn.query(RowFilter::All, &mut |row| {
        info!("Row {}: {}", row.id, row.reading());
    });
    match result {
        Ok(count) => count,
        Err(e) => {
            warn!("Failed to read back stored rows: {e}");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorgate_connectors::storage::MemoryStore;

    fn settings(attempts: u32) -> PersistenceSettings {
        PersistenceSettings {
            reset_on_connect: true,
            reconnect_attempts: attempts,
            reconnect_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn outage_keeps_rows_in_order() {
        let store = MemoryStore::new();
        store.schedule_outage(2, 1);
        let pipeline = Pipeline::new();
        for ts in 0..5 {
            pipeline.publish(Reading::new(1, ts as f64, ts));
        }
        pipeline.request_shutdown();

        let report = PersistenceWorker::new(store.clone(), settings(3))
            .run(pipeline)
            .unwrap();

        assert_eq!(report.inserted, 5);
        assert_eq!(report.reconnects, 1);
        assert_eq!(report.rows_at_shutdown, 5);
        let stamps: Vec<i64> = store.rows().iter().map(|row| row.timestamp).collect();
        assert_eq!(stamps, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn exhausted_reconnects_request_shutdown() {
        let store = MemoryStore::new();
        store.set_available(false);
        let pipeline = Pipeline::new();
        pipeline.publish(Reading::new(1, 20.0, 1));

        let err = PersistenceWorker::new(store, settings(2))
            .run(pipeline.clone())
            .unwrap_err();

        assert!(matches!(err, GatewayError::StorageExhausted { attempts: 2, .. }));
        assert!(pipeline.is_shutdown());
    }

    #[test]
    fn initial_failure_recovers_through_reconnect() {
        let store = MemoryStore::new();
        store.set_available(false);
        let pipeline = Pipeline::new();
        pipeline.publish(Reading::new(3, 19.5, 7));
        pipeline.request_shutdown();

        let worker = PersistenceWorker::new(store.clone(), settings(50));
        let handle = thread::spawn(move || worker.run(pipeline));
        thread::sleep(Duration::from_millis(5));
        store.set_available(true);

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.rows()[0].reading(), Reading::new(3, 19.5, 7));
    }
}
