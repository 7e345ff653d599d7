//! In-process storage backend
//!
//! Rows live behind a shared `parking_lot::Mutex`, so every clone of a
//! [`MemoryStore`] observes the same table. Outages can be switched on by
//! hand or scheduled to trip after a number of inserts.

use std::sync::Arc;

use parking_lot::Mutex;

use sensorgate_core::Reading;

use super::{RowFilter, StorageBackend, StorageConnection, StorageError, StorageResult, StoredRow};

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<StoredRow>,
    next_id: u64,
    offline: bool,
    inserts_before_outage: Option<usize>,
    in_outage: bool,
    refused_connects: u32,
    connects: u32,
}

/// Shared in-memory reading table
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the store offline or bring it back
    ///
    /// While offline every connect, insert and query fails.
    pub fn set_available(&self, available: bool) {
        self.state.lock().offline = !available;
    }

    /// Lose the connection after `inserts` more successful inserts, then
    /// refuse `refused_connects` reconnects before recovering
    pub fn schedule_outage(&self, inserts: usize, refused_connects: u32) {
        let mut state = self.state.lock();
        state.inserts_before_outage = Some(inserts);
        state.refused_connects = refused_connects;
    }

    /// Snapshot of every row in id order
    pub fn rows(&self) -> Vec<StoredRow> {
        self.state.lock().rows.clone()
    }

    /// Successful connects so far
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }
}

impl StorageBackend for MemoryStore {
    type Connection = MemoryConnection;

    fn connect(&self, reset: bool) -> StorageResult<MemoryConnection> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(StorageError::Unavailable("memory store is offline".into()));
        }
        if state.in_outage {
            if state.refused_connects > 0 {
                state.refused_connects -= 1;
                return Err(StorageError::Unavailable("memory store is recovering".into()));
            }
            state.in_outage = false;
        }
        if reset {
            state.rows.clear();
            state.next_id = 0;
        }
        state.connects += 1;
        Ok(MemoryConnection {
            state: Arc::clone(&self.state),
        })
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}

/// Handle to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
}

impl StorageConnection for MemoryConnection {
    fn insert(&mut self, reading: &Reading) -> StorageResult<u64> {
        let mut state = self.state.lock();
        if state.offline || state.in_outage {
            return Err(StorageError::Unavailable("connection lost".into()));
        }
        match state.inserts_before_outage {
            Some(0) => {
                state.inserts_before_outage = None;
                state.in_outage = true;
                return Err(StorageError::Unavailable("connection lost".into()));
            }
            Some(left) => state.inserts_before_outage = Some(left - 1),
            None => {}
        }
        state.next_id += 1;
        let id = state.next_id;
        state.rows.push(StoredRow::new(id, reading));
        Ok(id)
    }

    fn query(&mut self, filter: RowFilter, on_row: &mut dyn FnMut(&StoredRow)) -> StorageResult<usize> {
        let rows: Vec<StoredRow> = {
            let state = self.state.lock();
            if state.offline || state.in_outage {
                return Err(StorageError::Unavailable("connection lost".into()));
            }
            state.rows.iter().filter(|row| filter.matches(row)).copied().collect()
        };
        // Callback runs without the lock held
        rows.iter().for_each(|row| on_row(row));
        Ok(rows.len())
    }

    fn disconnect(self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_rows_and_restarts_ids() {
        let store = MemoryStore::new();
        let mut conn = store.connect(false).unwrap();
        assert_eq!(conn.insert(&Reading::new(1, 1.0, 1)).unwrap(), 1);
        assert_eq!(conn.insert(&Reading::new(1, 2.0, 2)).unwrap(), 2);

        let mut conn = store.connect(true).unwrap();
        assert!(store.rows().is_empty());
        assert_eq!(conn.insert(&Reading::new(1, 3.0, 3)).unwrap(), 1);
        assert_eq!(store.connect_count(), 2);
    }

    #[test]
    fn scheduled_outage_trips_and_recovers() {
        let store = MemoryStore::new();
        store.schedule_outage(2, 1);
        let mut conn = store.connect(true).unwrap();
        conn.insert(&Reading::new(1, 1.0, 1)).unwrap();
        conn.insert(&Reading::new(1, 1.0, 2)).unwrap();
        assert!(conn.insert(&Reading::new(1, 1.0, 3)).is_err());
        assert!(conn.insert(&Reading::new(1, 1.0, 3)).is_err());

        assert!(store.connect(false).is_err());
        let mut conn = store.connect(false).unwrap();
        assert_eq!(conn.insert(&Reading::new(1, 1.0, 3)).unwrap(), 3);
    }

    #[test]
    fn manual_switch_blocks_everything() {
        let store = MemoryStore::new();
        let mut conn = store.connect(true).unwrap();
        store.set_available(false);
        assert!(conn.insert(&Reading::new(1, 1.0, 1)).is_err());
        assert!(conn.query(RowFilter::All, &mut |_| {}).is_err());
        assert!(store.connect(false).is_err());
        store.set_available(true);
        assert!(store.connect(false).is_ok());
    }
}
