//! Asynchronous Log Sink
//!
//! ## Overview
//!
//! Every component logs through the `log` facade. The gateway installs a
//! [`SinkLogger`] that turns each record into an owned [`LogEntry`] and hands
//! it to a dedicated drain thread over a `crossbeam-channel`. Emitting never
//! blocks on file I/O.
//!
//! ```text
//!  connmgr ─┐
//!  datamgr ─┼─ log::info!(..) ─▶ SinkLogger ─▶ channel ─▶ drain thread ─▶ gateway.log
//!  storage ─┘                      │  (timestamp at emission)    (seq in arrival order)
//!                                  └─ warn and above echoed to stderr
//! ```
//!
//! ## Line Format
//!
//! ```text
//! <seq> <emission time, RFC 3339 UTC> <LEVEL> <message>
//! 0 2023-11-14T22:13:20Z INFO Listening for sensor nodes on 0.0.0.0:1234
//! ```
//!
//! Sequence numbers start at 0 and are assigned by the drain, so the file is
//! strictly ordered by sequence even when several threads log at once.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, SecondsFormat, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};

use sensorgate_core::time::{SystemTime, TimeSource, Timestamp};

use crate::errors::{GatewayError, GatewayResult};

/// One record on its way to the drain
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Epoch seconds at emission
    pub timestamp: Timestamp,
    pub level: Level,
    pub message: String,
}

enum SinkMessage {
    Entry(LogEntry),
    Shutdown,
}

/// `log::Log` implementation feeding the drain thread
pub struct SinkLogger {
    sender: Sender<SinkMessage>,
    level: LevelFilter,
    clock: Arc<dyn TimeSource>,
    echo_stderr: bool,
}

impl SinkLogger {
    /// Disable the stderr echo of warnings (tests)
    pub fn without_stderr(mut self) -> Self {
        self.echo_stderr = false;
        self
    }

    /// Install as the process-wide logger
    pub fn install(self) -> GatewayResult<()> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry {
            timestamp: self.clock.now(),
            level: record.level(),
            message: record.args().to_string(),
        };
        if self.echo_stderr && entry.level <= Level::Warn {
            eprintln!("[{}] {}", entry.level, entry.message);
        }
        // After shutdown the drain is gone; late records are dropped
        let _ = self.sender.send(SinkMessage::Entry(entry));
    }

    fn flush(&self) {}
}

/// Owner of the drain thread
///
/// [`shutdown`](Self::shutdown) (or drop) writes out everything already
/// emitted and joins the drain.
pub struct LogSink {
    sender: Sender<SinkMessage>,
    drain: Option<JoinHandle<()>>,
}

impl LogSink {
    /// Open (append) the log file and start the drain thread
    pub fn start(path: &Path, level: LevelFilter) -> GatewayResult<(Self, SinkLogger)> {
        Self::start_with_clock(path, level, Arc::new(SystemTime))
    }

    /// As [`start`](Self::start), with an explicit emission clock
    pub fn start_with_clock(
        path: &Path,
        level: LevelFilter,
        clock: Arc<dyn TimeSource>,
    ) -> GatewayResult<(Self, SinkLogger)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| GatewayError::LogFile {
                path: path.to_path_buf(),
                source,
            })?;

        let (sender, receiver) = unbounded();
        let drain = std::thread::Builder::new()
            .name("log-drain".into())
            .spawn(move || write_entries(receiver, BufWriter::new(file)))
            .map_err(|source| GatewayError::ThreadSpawn {
                name: "log-drain",
                source,
            })?;

        let logger = SinkLogger {
            sender: sender.clone(),
            level,
            clock,
            echo_stderr: true,
        };
        Ok((
            Self {
                sender,
                drain: Some(drain),
            },
            logger,
        ))
    }

    /// Flush every emitted record and stop the drain
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.drain.take() {
            let _ = self.sender.send(SinkMessage::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Format one log line
pub fn format_line(seq: u64, entry: &LogEntry) -> String {
    let time = DateTime::<Utc>::from_timestamp(entry.timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| entry.timestamp.to_string());
    format!("{seq} {time} {} {}", entry.level, entry.message)
}

fn write_entries<W: Write>(receiver: Receiver<SinkMessage>, mut writer: W) {
    let mut seq = 0u64;
    for message in receiver.iter() {
        match message {
            SinkMessage::Entry(entry) => {
                if let Err(e) = writeln!(writer, "{}", format_line(seq, &entry)) {
                    eprintln!("Error writing to log file: {e}");
                }
                seq += 1;
                if receiver.is_empty() {
                    let _ = writer.flush();
                }
            }
            SinkMessage::Shutdown => break,
        }
    }
    let _ = writer.flush();
}
