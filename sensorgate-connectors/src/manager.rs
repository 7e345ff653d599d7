//! TCP Connection Manager
//!
//! ## Overview
//!
//! The connection manager owns the listening socket and every sensor link.
//! It runs on its own thread and is the only producer of the shared buffer.
//!
//! ## Event Loop
//!
//! ```text
//! loop
//!   ├─ shutdown requested? ────────────────────────────▶ exit
//!   ├─ timeout = soonest deadline - now (zero with a backlog)
//!   ├─ poll(listener + sensors + waker, timeout)
//!   ├─ listener ready → accept until WouldBlock, first read of each
//!   ├─ sensor ready   → up to READS_PER_WAKE reads, publish after each
//!   ├─ backlog        → same budget for links left unfinished last round
//!   ├─ sweep: close + remove every sensor past its deadline
//!   └─ only the listener left for a full idle window? ──▶ exit
//! ```
//!
//! Sockets are registered edge-triggered, so a readiness event is not
//! repeated while data remains queued. A link that exhausts its read budget
//! before `WouldBlock` goes on the backlog and is served again on the next
//! iteration, which then polls without blocking.
//!
//! ## Deadlines
//!
//! A sensor's deadline is `last_activity + idle_timeout`, where
//! `last_activity` only moves on a complete record. The listener has no
//! deadline of its own while sensors are connected. Once it is alone, its
//! `last_activity` marks the start of the grace window and the manager stops
//! when that window elapses without a new connection.
//!
//! ## Registry
//!
//! Connections live in a [`Registry`] with [`ConnectionOps`]. The listener
//! entry sits at index 0; sensors are appended. Releasing an entry through
//! the registry deregisters it from the poller and closes the socket, so
//! dropping the registry tears everything down.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use sensorgate_core::constants::network::{EVENTS_CAPACITY, READS_PER_WAKE, READ_CHUNK_SIZE};
use sensorgate_core::registry::{ElementOps, Registry};
use sensorgate_core::{Pipeline, Reading};

use crate::wire::RecordDecoder;
use crate::{ConnectionStats, ConnectorError, ConnectorResult};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_SENSOR: usize = 2;

/// Connection manager settings
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Silence after which a sensor link is closed; also the listener's
    /// grace window once no sensor is left
    pub idle_timeout: Duration,
    /// Optional text mirror of every received record
    pub capture_path: Option<PathBuf>,
}

/// Socket behind a registry entry
#[derive(Debug)]
pub enum Endpoint {
    /// The listening socket (index 0, never times out)
    Listener(TcpListener),
    /// An accepted sensor link
    Sensor {
        stream: TcpStream,
        peer: SocketAddr,
        decoder: RecordDecoder,
    },
}

/// One registry entry
#[derive(Debug)]
pub struct Connection {
    token: Token,
    endpoint: Endpoint,
    /// Last complete record received on this link
    pub last_reading: Option<Reading>,
    /// Time of the last complete record (or of the accept)
    pub last_activity: Instant,
    /// Peer half-closed its side; the entry stays until its deadline
    pub peer_closed: bool,
}

impl Connection {
    fn is_listener(&self) -> bool {
        matches!(self.endpoint, Endpoint::Listener(_))
    }

    fn describe(&self) -> String {
        match (&self.last_reading, &self.endpoint) {
            (Some(reading), _) => reading.sensor_id.to_string(),
            (None, Endpoint::Sensor { peer, .. }) => format!("unidentified peer {peer}"),
            (None, Endpoint::Listener(_)) => "listener".to_string(),
        }
    }
}

/// Registry capabilities for connections
///
/// Sockets cannot be duplicated; releasing one deregisters it from the poller
/// and closes it.
pub struct ConnectionOps {
    registry: mio::Registry,
}

impl ElementOps<Connection> for ConnectionOps {
    fn copy(&self, _element: &Connection) -> Option<Connection> {
        None
    }

    fn free(&self, mut element: Connection) {
        match &mut element.endpoint {
            Endpoint::Listener(listener) => {
                let _ = self.registry.deregister(listener);
            }
            Endpoint::Sensor { stream, .. } => {
                let _ = self.registry.deregister(stream);
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    fn compare(&self, a: &Connection, b: &Connection) -> std::cmp::Ordering {
        a.token.cmp(&b.token)
    }
}

/// Multiplexes the listener and all sensor links on one thread
pub struct ConnectionManager {
    poll: Poll,
    connections: Registry<Connection, ConnectionOps>,
    pipeline: Pipeline,
    config: ManagerConfig,
    local_addr: SocketAddr,
    capture: Option<BufWriter<File>>,
    stats: ConnectionStats,
    next_token: usize,
    /// Links with data left after their read budget
    backlog: Vec<Token>,
}

impl ConnectionManager {
    /// Bind the listener and prepare the poller
    ///
    /// Also hooks the pipeline's shutdown flag to a `mio::Waker`, so a
    /// shutdown requested from any thread interrupts the readiness wait.
    pub fn bind(addr: SocketAddr, pipeline: Pipeline, config: ManagerConfig) -> ConnectorResult<Self> {
        let poll = Poll::new().map_err(ConnectorError::Poll)?;
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ConnectorError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        pipeline.shutdown().on_request(move || {
            let _ = waker.wake();
        });

        let capture = match &config.capture_path {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };

        let ops = ConnectionOps {
            registry: poll.registry().try_clone()?,
        };
        let mut connections = Registry::new(ops);
        connections.insert_at_index(
            Connection {
                token: LISTENER,
                endpoint: Endpoint::Listener(listener),
                last_reading: None,
                last_activity: Instant::now(),
                peer_closed: false,
            },
            0,
        );

        info!("Listening for sensor nodes on {local_addr}");
        Ok(Self {
            poll,
            connections,
            pipeline,
            config,
            local_addr,
            capture,
            stats: ConnectionStats::default(),
            next_token: FIRST_SENSOR,
            backlog: Vec::new(),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until shutdown or until no sensor is left for one idle window
    ///
    /// Always requests pipeline shutdown on exit so the consumers drain and
    /// stop. Poll and accept failures are returned as errors.
    pub fn run(mut self) -> ConnectorResult<ConnectionStats> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let result = self.event_loop(&mut events);
        if let Err(e) = &result {
            error!("Connection manager failed: {e}");
        }
        self.teardown();
        result.map(|()| self.stats.clone())
    }

    fn event_loop(&mut self, events: &mut Events) -> ConnectorResult<()> {
        loop {
            if self.pipeline.is_shutdown() {
                info!("Shutdown requested, closing connection manager");
                return Ok(());
            }

            let timeout = if self.backlog.is_empty() {
                self.next_deadline().saturating_duration_since(Instant::now())
            } else {
                Duration::ZERO
            };
            if let Err(e) = self.poll.poll(events, Some(timeout)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(ConnectorError::Poll(e));
            }

            let backlog = std::mem::take(&mut self.backlog);
            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all()?,
                    WAKER => {}
                    token => self.serve(token),
                }
            }
            for token in backlog {
                self.serve(token);
            }

            let now = Instant::now();
            self.sweep(now);
            if self.listener_expired(now) {
                info!(
                    "No sensor node connected within {:?}, closing connection manager",
                    self.config.idle_timeout
                );
                return Ok(());
            }
        }
    }

    /// Soonest sensor deadline, or the listener's once it is alone
    fn next_deadline(&self) -> Instant {
        let timeout = self.config.idle_timeout;
        let sensors = self
            .connections
            .iter()
            .filter(|conn| !conn.is_listener())
            .map(|conn| conn.last_activity + timeout)
            .min();
        match sensors {
            Some(deadline) => deadline,
            None => self.listener_idle_since() + timeout,
        }
    }

    fn listener_idle_since(&self) -> Instant {
        self.connections
            .get_element_at_index(0)
            .map(|conn| conn.last_activity)
            .unwrap_or_else(Instant::now)
    }

    fn listener_expired(&self, now: Instant) -> bool {
        self.connections.len() == 1 && now >= self.listener_idle_since() + self.config.idle_timeout
    }

    fn accept_all(&mut self) -> ConnectorResult<()> {
        loop {
            let accepted = match self.connections.get_element_at_index(0) {
                Some(Connection {
                    endpoint: Endpoint::Listener(listener),
                    ..
                }) => listener.accept(),
                _ => return Ok(()),
            };
            match accepted {
                Ok((stream, peer)) => self.register(stream, peer)?,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectorError::Accept(e)),
            }
        }
    }

    fn register(&mut self, mut stream: TcpStream, peer: SocketAddr) -> ConnectorResult<()> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)?;

        self.connections.insert_at_index(
            Connection {
                token,
                endpoint: Endpoint::Sensor {
                    stream,
                    peer,
                    decoder: RecordDecoder::new(),
                },
                last_reading: None,
                last_activity: Instant::now(),
                peer_closed: false,
            },
            isize::MAX,
        );
        self.stats.accepted += 1;
        self.stats.peak_connections = self.stats.peak_connections.max(self.connections.len() - 1);
        debug!("Accepted connection from {peer}");

        // Data may already be queued; edge-triggered readiness will not
        // report it again
        self.serve(token);
        Ok(())
    }

    /// Give one link its read budget, backlogging it if data remains
    fn serve(&mut self, token: Token) {
        if !self.drain(token) && !self.backlog.contains(&token) {
            self.backlog.push(token);
        }
    }

    /// Read up to [`READS_PER_WAKE`] chunks from one sensor link, publishing
    /// complete records after each chunk
    ///
    /// Returns `false` when the budget ran out before the socket reported
    /// `WouldBlock` or end of stream.
    fn drain(&mut self, token: Token) -> bool {
        let Some(conn) = self.connections.find_mut(|conn| conn.token == token) else {
            return true;
        };
        let Connection {
            endpoint,
            last_reading,
            last_activity,
            peer_closed,
            ..
        } = conn;
        let Endpoint::Sensor {
            stream,
            peer,
            decoder,
        } = endpoint
        else {
            return true;
        };

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut eof = false;
        let mut drained = false;
        for _ in 0..READS_PER_WAKE {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    decoder.feed(&chunk[..n]);
                    self.stats.bytes_received += n as u64;
                    let mut intake = Intake {
                        pipeline: &self.pipeline,
                        capture: &mut self.capture,
                        stats: &mut self.stats,
                    };
                    intake.publish_from(decoder, last_reading, last_activity);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    drained = true;
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Read from {peer} failed: {e}");
                    eof = true;
                    break;
                }
            }
        }

        if eof && !*peer_closed {
            *peer_closed = true;
            let dropped = decoder.discard_partial();
            if dropped > 0 {
                self.stats.partial_dropped += 1;
                warn!("Dropped {dropped} trailing bytes of an incomplete record from {peer}");
            }
            debug!("Peer {peer} closed its side");
        }
        eof || drained
    }

    /// Close and remove every sensor link past its deadline
    fn sweep(&mut self, now: Instant) {
        let timeout = self.config.idle_timeout;
        let mut removed = false;

        let mut cursor = self.connections.first_reference();
        while let Some(current) = cursor {
            cursor = self.connections.next_reference(current);
            let expired = match self.connections.element_at_reference(current) {
                Some(conn) if !conn.is_listener() && now >= conn.last_activity + timeout => {
                    info!(
                        "The sensor node with {} has closed the connection",
                        conn.describe()
                    );
                    true
                }
                _ => false,
            };
            if expired && self.connections.free_at_reference(current) {
                self.stats.timed_out += 1;
                removed = true;
            }
        }

        if removed && self.connections.len() == 1 {
            if let Some(listener) = self.connections.get_element_at_index_mut(0) {
                listener.last_activity = now;
            }
            info!("The last connection has been removed, waiting for another idle window");
        }
    }

    fn teardown(&mut self) {
        self.stats.closed_at_shutdown = self.connections.len().saturating_sub(1) as u64;
        self.connections.clear();
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.flush() {
                warn!("Failed to flush capture file: {e}");
            }
        }
        self.pipeline.request_shutdown();
        info!(
            "Connection manager stopped: {} accepted, {} timed out, {} records",
            self.stats.accepted, self.stats.timed_out, self.stats.records
        );
    }
}

/// Destination of decoded records: the pipeline, the capture file and the
/// counters
struct Intake<'a> {
    pipeline: &'a Pipeline,
    capture: &'a mut Option<BufWriter<File>>,
    stats: &'a mut ConnectionStats,
}

impl Intake<'_> {
    fn publish_from(
        &mut self,
        decoder: &mut RecordDecoder,
        last_reading: &mut Option<Reading>,
        last_activity: &mut Instant,
    ) {
        while let Some(reading) = decoder.next_record() {
            if last_reading.is_none() {
                info!(
                    "A sensor node with {} has opened a new connection",
                    reading.sensor_id
                );
            }
            *last_reading = Some(reading);
            *last_activity = Instant::now();
            self.stats.records += 1;

            let capture_failed = match self.capture.as_mut() {
                Some(capture) => writeln!(
                    capture,
                    "{} {} {}",
                    reading.sensor_id, reading.value, reading.timestamp
                )
                .err(),
                None => None,
            };
            if let Some(e) = capture_failed {
                warn!("Capture write failed, disabling capture: {e}");
                *self.capture = None;
            }
            debug!("Received {reading}");
            self.pipeline.publish(reading);
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.connections.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Connect to a gateway and stream readings, as a sensor node would
///
/// Used by tests and the bundled tooling; blocks until all records are
/// written.
pub fn send_readings(addr: SocketAddr, readings: &[Reading]) -> io::Result<std::net::TcpStream> {
    let mut stream = std::net::TcpStream::connect(addr)?;
    crate::wire::write_records(&mut stream, readings)?;
    Ok(stream)
}
