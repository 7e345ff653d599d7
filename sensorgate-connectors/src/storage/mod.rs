//! Storage Contract for Persisted Readings
//!
//! ## Overview
//!
//! The persistence worker only talks to storage through two traits:
//!
//! - [`StorageBackend`]: a factory that opens connections, optionally
//!   resetting the reading table first
//! - [`StorageConnection`]: an open handle that inserts rows and runs
//!   filtered queries with a per-row callback
//!
//! Every reading becomes one [`StoredRow`] with an auto-incremented id.
//! An insert or query failure means the connection is lost; the caller drops
//! the handle and reconnects through the backend.
//!
//! ## Backends
//!
//! | Backend            | Durability | Notes                                    |
//! |--------------------|------------|------------------------------------------|
//! | [`JsonLinesStore`] | file       | one JSON row per line, reset truncates   |
//! | [`MemoryStore`]    | process    | shared handle, injectable outages        |
//!
//! ## Query Filters
//!
//! ```rust
//! use sensorgate_connectors::storage::{MemoryStore, RowFilter, StorageBackend, StorageConnection};
//! use sensorgate_core::Reading;
//!
//! let store = MemoryStore::new();
//! let mut conn = store.connect(true)?;
//! conn.insert(&Reading::new(1, 19.0, 100))?;
//! conn.insert(&Reading::new(2, 26.5, 101))?;
//!
//! let mut hot = Vec::new();
//! conn.query(RowFilter::ValueAbove(25.0), &mut |row| hot.push(row.sensor_id))?;
//! assert_eq!(hot, vec![2]);
//! # Ok::<(), sensorgate_connectors::StorageError>(())
//! ```

mod jsonl;
mod memory;

use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sensorgate_core::{Reading, SensorId, Timestamp};

use crate::wire::RecordReader;
use crate::ConnectorResult;

pub use jsonl::{JsonLinesConnection, JsonLinesStore};
pub use memory::{MemoryConnection, MemoryStore};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend refused the connection or dropped it
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// File operation failed
    #[error("Storage I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored row could not be parsed back
    #[error("Corrupt row at line {line} of {}: {source}", path.display())]
    Corrupt {
        /// Storage file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A row could not be serialized
    #[error("Failed to encode row: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One persisted reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Auto-incremented primary key, starting at 1
    pub id: u64,
    pub sensor_id: SensorId,
    pub value: f64,
    pub timestamp: Timestamp,
}

impl StoredRow {
    /// Build the row for a reading
    pub fn new(id: u64, reading: &Reading) -> Self {
        Self {
            id,
            sensor_id: reading.sensor_id,
            value: reading.value,
            timestamp: reading.timestamp,
        }
    }

    /// The reading this row stores
    pub fn reading(&self) -> Reading {
        Reading::new(self.sensor_id, self.value, self.timestamp)
    }
}

/// Row predicate for [`StorageConnection::query`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowFilter {
    /// Every row
    All,
    /// Rows whose value equals the given one
    ValueEquals(f64),
    /// Rows whose value is strictly greater
    ValueAbove(f64),
    /// Rows sampled at exactly this timestamp
    TimestampEquals(Timestamp),
    /// Rows sampled strictly after this timestamp
    TimestampAfter(Timestamp),
}

impl RowFilter {
    /// Check whether a row passes the filter
    pub fn matches(&self, row: &StoredRow) -> bool {
        match *self {
            RowFilter::All => true,
            RowFilter::ValueEquals(value) => row.value == value,
            RowFilter::ValueAbove(value) => row.value > value,
            RowFilter::TimestampEquals(ts) => row.timestamp == ts,
            RowFilter::TimestampAfter(ts) => row.timestamp > ts,
        }
    }
}

/// Factory for storage connections
pub trait StorageBackend: Send + Sync {
    /// Connection type handed out by this backend
    type Connection: StorageConnection;

    /// Open a connection; `reset` drops and recreates the reading table
    fn connect(&self, reset: bool) -> StorageResult<Self::Connection>;

    /// Human-readable location for log messages
    fn describe(&self) -> String;
}

/// Open storage handle
pub trait StorageConnection: Send {
    /// Append one row, returning its id
    fn insert(&mut self, reading: &Reading) -> StorageResult<u64>;

    /// Call `on_row` for every row passing `filter`, in id order
    ///
    /// Returns the number of matching rows.
    fn query(&mut self, filter: RowFilter, on_row: &mut dyn FnMut(&StoredRow)) -> StorageResult<usize>;

    /// Close the handle
    fn disconnect(self) -> StorageResult<()>
    where
        Self: Sized;
}

/// Insert every record of a binary record stream
///
/// Records before a trailing partial record are kept; the partial record
/// itself is reported as an error.
pub fn import_records<C, R>(conn: &mut C, reader: R) -> ConnectorResult<usize>
where
    C: StorageConnection,
    R: Read,
{
    let mut imported = 0;
    for record in RecordReader::new(reader) {
        conn.insert(&record?)?;
        imported += 1;
    }
    log::info!("Imported {imported} records into storage");
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::write_records;
    use crate::ConnectorError;

    fn row(id: u64, value: f64, timestamp: Timestamp) -> StoredRow {
        StoredRow {
            id,
            sensor_id: 1,
            value,
            timestamp,
        }
    }

    #[test]
    fn filters_match_original_query_family() {
        let r = row(1, 21.5, 1000);
        assert!(RowFilter::All.matches(&r));
        assert!(RowFilter::ValueEquals(21.5).matches(&r));
        assert!(!RowFilter::ValueEquals(21.0).matches(&r));
        assert!(RowFilter::ValueAbove(21.0).matches(&r));
        assert!(!RowFilter::ValueAbove(21.5).matches(&r));
        assert!(RowFilter::TimestampEquals(1000).matches(&r));
        assert!(RowFilter::TimestampAfter(999).matches(&r));
        assert!(!RowFilter::TimestampAfter(1000).matches(&r));
    }

    #[test]
    fn import_inserts_every_complete_record() {
        let readings = [Reading::new(1, 1.0, 1), Reading::new(2, 2.0, 2), Reading::new(3, 3.0, 3)];
        let mut bytes = Vec::new();
        write_records(&mut bytes, &readings).unwrap();

        let store = MemoryStore::new();
        let mut conn = store.connect(true).unwrap();
        assert_eq!(import_records(&mut conn, bytes.as_slice()).unwrap(), 3);
        let stored: Vec<Reading> = store.rows().iter().map(StoredRow::reading).collect();
        assert_eq!(stored, readings);

        bytes.push(0xff);
        let err = import_records(&mut conn, bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ConnectorError::Core(_)));
        assert_eq!(store.rows().len(), 6);
    }
}
