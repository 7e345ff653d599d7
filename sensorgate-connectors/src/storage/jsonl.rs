//! Durable JSON-lines storage backend
//!
//! One table per file, one [`StoredRow`] per line:
//!
//! ```text
//! {"id":1,"sensor_id":15,"value":21.43,"timestamp":1700000000}
//! {"id":2,"sensor_id":21,"value":19.87,"timestamp":1700000001}
//! ```
//!
//! Each row reaches the file with a single unbuffered write before the insert
//! is acknowledged. A failed write is rolled back to the previous file length,
//! so a rejected insert never leaves a row or a torn line behind. Connecting
//! without a reset resumes the id sequence after the highest id on disk.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use sensorgate_core::Reading;

use super::{RowFilter, StorageBackend, StorageConnection, StorageError, StorageResult, StoredRow};

/// File-backed reading table
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    /// Store rows in `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StorageBackend for JsonLinesStore {
    type Connection = JsonLinesConnection;

    fn connect(&self, reset: bool) -> StorageResult<JsonLinesConnection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Append mode keeps every write at the end, including after a rollback
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        if reset {
            file.set_len(0).map_err(|e| self.io_error(e))?;
        }

        let mut conn = JsonLinesConnection {
            path: self.path.clone(),
            file,
            last_id: 0,
        };
        if reset {
            log::info!("New reading table created at {}", self.path.display());
        } else {
            conn.last_id = last_id_on_disk(&self.path)?;
        }
        Ok(conn)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn last_id_on_disk(path: &Path) -> StorageResult<u64> {
    let mut last = 0;
    for_each_row(path, |row| last = last.max(row.id))?;
    Ok(last)
}

/// Parse every row of the table file in order
fn for_each_row(path: &Path, mut on_row: impl FnMut(&StoredRow)) -> StorageResult<()> {
    let file = File::open(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let row: StoredRow = serde_json::from_str(&line).map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        on_row(&row);
    }
    Ok(())
}

/// Open handle on a [`JsonLinesStore`]
#[derive(Debug)]
pub struct JsonLinesConnection {
    path: PathBuf,
    file: File,
    last_id: u64,
}

impl JsonLinesConnection {
    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StorageConnection for JsonLinesConnection {
    fn insert(&mut self, reading: &Reading) -> StorageResult<u64> {
        let row = StoredRow::new(self.last_id + 1, reading);
        let mut line = serde_json::to_vec(&row)?;
        line.push(b'\n');
        append_line(&mut self.file, &line).map_err(|e| self.io_error(e))?;
        self.last_id = row.id;
        Ok(row.id)
    }

    fn query(&mut self, filter: RowFilter, on_row: &mut dyn FnMut(&StoredRow)) -> StorageResult<usize> {
        let mut matched = 0;
        for_each_row(&self.path, |row| {
            if filter.matches(row) {
                matched += 1;
                on_row(row);
            }
        })?;
        Ok(matched)
    }

    fn disconnect(self) -> StorageResult<()> {
        self.file.sync_data().map_err(|e| self.io_error(e))
    }
}

/// Append `line` in one write, truncating back to the previous length if the
/// write fails part way
fn append_line(file: &mut File, line: &[u8]) -> io::Result<()> {
    let len = file.metadata()?.len();
    let written = file.write_all(line);
    if written.is_err() {
        if let Err(e) = file.set_len(len) {
            log::warn!("Failed to roll back a rejected row: {e}");
        }
    }
    written
}
