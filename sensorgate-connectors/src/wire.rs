//! Binary Wire Format for Sensor Records
//!
//! Sensors stream records back to back with no framing. Each record is
//! [`RECORD_SIZE`] bytes, little-endian:
//!
//! ```text
//! offset 0   sensor id   u16
//! offset 2   value       f64
//! offset 10  timestamp   i64 (epoch seconds)
//! ```
//!
//! A TCP read can end anywhere inside a record, so the connection manager
//! accumulates bytes per connection in a [`RecordDecoder`] and only consumes
//! complete records. The same layout is used by record files handed to
//! [`RecordReader`] for bulk import.

use std::io::{self, Read, Write};

use sensorgate_core::constants::network::{SENSOR_ID_SIZE, TIMESTAMP_SIZE, VALUE_SIZE};
use sensorgate_core::{CoreError, Reading};

pub use sensorgate_core::constants::network::RECORD_SIZE;

use crate::{ConnectorError, ConnectorResult};

const VALUE_OFFSET: usize = SENSOR_ID_SIZE;
const TIMESTAMP_OFFSET: usize = SENSOR_ID_SIZE + VALUE_SIZE;

/// Encode one reading
pub fn encode(reading: &Reading) -> [u8; RECORD_SIZE] {
    let mut record = [0u8; RECORD_SIZE];
    record[..VALUE_OFFSET].copy_from_slice(&reading.sensor_id.to_le_bytes());
    record[VALUE_OFFSET..TIMESTAMP_OFFSET].copy_from_slice(&reading.value.to_le_bytes());
    record[TIMESTAMP_OFFSET..].copy_from_slice(&reading.timestamp.to_le_bytes());
    record
}

/// Decode one reading from the front of `bytes`
///
/// Fails with [`CoreError::ShortRecord`] when fewer than [`RECORD_SIZE`]
/// bytes are available.
pub fn decode(bytes: &[u8]) -> Result<Reading, CoreError> {
    if bytes.len() < RECORD_SIZE {
        return Err(CoreError::ShortRecord {
            required: RECORD_SIZE,
            available: bytes.len(),
        });
    }
    let mut id = [0u8; SENSOR_ID_SIZE];
    let mut value = [0u8; VALUE_SIZE];
    let mut timestamp = [0u8; TIMESTAMP_SIZE];
    id.copy_from_slice(&bytes[..VALUE_OFFSET]);
    value.copy_from_slice(&bytes[VALUE_OFFSET..TIMESTAMP_OFFSET]);
    timestamp.copy_from_slice(&bytes[TIMESTAMP_OFFSET..RECORD_SIZE]);

    Ok(Reading::new(
        u16::from_le_bytes(id),
        f64::from_le_bytes(value),
        i64::from_le_bytes(timestamp),
    ))
}

/// Write readings back to back
pub fn write_records<W: Write>(mut writer: W, readings: &[Reading]) -> io::Result<()> {
    for reading in readings {
        writer.write_all(&encode(reading))?;
    }
    writer.flush()
}

/// Per-connection accumulator for partially received records
#[derive(Debug, Default, Clone)]
pub struct RecordDecoder {
    pending: Vec<u8>,
}

impl RecordDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the next complete record, if any
    pub fn next_record(&mut self) -> Option<Reading> {
        let reading = decode(&self.pending).ok()?;
        self.pending.drain(..RECORD_SIZE);
        Some(reading)
    }

    /// Bytes of an incomplete record held back
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard an incomplete record, returning how many bytes were dropped
    pub fn discard_partial(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

/// Iterator over the records of a byte stream
///
/// Yields an error for a trailing partial record and stops afterwards.
#[derive(Debug)]
pub struct RecordReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    fn read_record(&mut self) -> ConnectorResult<Option<Reading>> {
        let mut record = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.reader.read(&mut record[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectorError::Io(e)),
            }
        }
        match filled {
            0 => Ok(None),
            _ => Ok(Some(decode(&record[..filled])?)),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = ConnectorResult<Reading>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(reading)) => Some(Ok(reading)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_little_endian_id_value_timestamp() {
        let record = encode(&Reading::new(0x0102, 1.0, 3));
        assert_eq!(record.len(), 18);
        assert_eq!(&record[..2], &[0x02, 0x01]);
        assert_eq!(&record[2..10], &1.0f64.to_le_bytes());
        assert_eq!(&record[10..], &3i64.to_le_bytes());
        assert_eq!(decode(&record).unwrap(), Reading::new(0x0102, 1.0, 3));
    }

    #[test]
    fn short_input_is_rejected() {
        let err = decode(&[0u8; 17]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ShortRecord {
                required: 18,
                available: 17
            }
        ));
    }

    #[test]
    fn decoder_reassembles_split_records() {
        let a = encode(&Reading::new(1, 20.0, 10));
        let b = encode(&Reading::new(2, 21.0, 11));
        let stream: Vec<u8> = a.iter().chain(b.iter()).copied().collect();

        let mut decoder = RecordDecoder::new();
        decoder.feed(&stream[..5]);
        assert_eq!(decoder.next_record(), None);
        decoder.feed(&stream[5..25]);
        assert_eq!(decoder.next_record().map(|r| r.sensor_id), Some(1));
        assert_eq!(decoder.next_record(), None);
        assert_eq!(decoder.pending_len(), 7);
        decoder.feed(&stream[25..]);
        assert_eq!(decoder.next_record().map(|r| r.sensor_id), Some(2));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn reader_reports_trailing_partial() {
        let mut bytes = Vec::new();
        write_records(&mut bytes, &[Reading::new(5, 1.5, 100), Reading::new(6, 2.5, 101)]).unwrap();
        bytes.extend_from_slice(&[9, 9, 9]);

        let results: Vec<_> = RecordReader::new(bytes.as_slice()).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].as_ref().unwrap().sensor_id, 6);
        assert!(matches!(
            results[2],
            Err(ConnectorError::Core(CoreError::ShortRecord { available: 3, .. }))
        ));
    }
}
