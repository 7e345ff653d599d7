//! Gateway Assembly
//!
//! ## Thread Layout
//!
//! ```text
//!            ┌──────────┐  publish   ┌──────────────┐  Aggregator  ┌──────────┐
//! sensors ──▶│ connmgr  │──────────▶ │ SharedBuffer │ ───────────▶ │ datamgr  │
//!            └──────────┘            └──────────────┘              └──────────┘
//!                 │                        │ Store                 ┌────────────┐
//!                 │                        └─────────────────────▶ │ storagemgr │
//!                 │                                                └────────────┘
//!                 └── request_shutdown() on exit ──▶ both consumers drain and stop
//! ```
//!
//! The listener is bound on the caller's thread so bind errors surface from
//! [`Gateway::start`] directly and [`Gateway::local_addr`] is valid as soon
//! as it returns.

use std::net::{Ipv4Addr, SocketAddr};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use sensorgate_connectors::{
    ConnectionManager, ConnectionStats, ConnectorResult, ManagerConfig, StorageBackend,
};
use sensorgate_core::constants::RUN_AVG_LENGTH;
use sensorgate_core::sensor::SensorTable;
use sensorgate_core::Pipeline;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::workers::{
    Aggregator, AggregatorReport, PersistenceReport, PersistenceSettings, PersistenceWorker,
};

/// Everything the worker threads report once joined
#[derive(Debug)]
pub struct GatewayReport<const N: usize = RUN_AVG_LENGTH> {
    /// Connection manager counters
    pub connections: ConnectionStats,
    /// Final sensor table and aggregation counters
    pub aggregator: AggregatorReport<N>,
    /// Storage counters
    pub persistence: PersistenceReport,
}

/// A running gateway: one connection manager and two consumers
pub struct Gateway<const N: usize = RUN_AVG_LENGTH> {
    pipeline: Pipeline,
    local_addr: SocketAddr,
    connmgr: JoinHandle<ConnectorResult<ConnectionStats>>,
    datamgr: JoinHandle<AggregatorReport<N>>,
    storagemgr: JoinHandle<GatewayResult<PersistenceReport>>,
}

/// Requests termination if the owning thread unwinds, so the other threads
/// never wait on a peer that is gone
struct ShutdownOnPanic(Pipeline);

impl Drop for ShutdownOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.request_shutdown();
        }
    }
}

fn worker_builder(name: &'static str) -> thread::Builder {
    thread::Builder::new().name(name.into())
}

fn spawn_worker<T, F>(
    builder: thread::Builder,
    name: &'static str,
    pipeline: &Pipeline,
    body: F,
) -> GatewayResult<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let guard = ShutdownOnPanic(pipeline.clone());
    builder
        .spawn(move || {
            let _guard = guard;
            body()
        })
        .map_err(|source| {
            pipeline.request_shutdown();
            GatewayError::ThreadSpawn { name, source }
        })
}

fn join_worker<T>(name: &'static str, handle: JoinHandle<T>) -> GatewayResult<T> {
    handle.join().map_err(|_| GatewayError::WorkerPanicked(name))
}

/// Join a thread started before a later spawn failed; shutdown has already
/// been requested, so it exits promptly
fn join_started<T>(name: &'static str, handle: JoinHandle<T>) {
    if join_worker(name, handle).is_err() {
        warn!("The {name} thread panicked while the gateway was starting");
    }
}

impl<const N: usize> Gateway<N> {
    /// Load the sensor map from the configuration and start on `port`
    /// (all interfaces)
    pub fn start<B>(port: u16, config: &GatewayConfig, backend: B) -> GatewayResult<Self>
    where
        B: StorageBackend + 'static,
    {
        let table = SensorTable::from_map_file(&config.aggregation.sensor_map)?;
        info!(
            "Loaded {} sensors from {}",
            table.total_sensors(),
            config.aggregation.sensor_map.display()
        );
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        Self::start_with_table(addr, config, table, backend)
    }

    /// Start with an already loaded sensor table
    pub fn start_with_table<B>(
        addr: SocketAddr,
        config: &GatewayConfig,
        table: SensorTable<N>,
        backend: B,
    ) -> GatewayResult<Self>
    where
        B: StorageBackend + 'static,
    {
        let pipeline = Pipeline::new();
        let manager = ConnectionManager::bind(
            addr,
            pipeline.clone(),
            ManagerConfig {
                idle_timeout: config.network.idle_timeout(),
                capture_path: config.logging.capture_path.clone(),
            },
        )?;

        let aggregator = Aggregator::new(table, config.aggregation.thresholds());
        let persistence = PersistenceWorker::new(backend, PersistenceSettings::from(&config.storage));

        Self::launch(pipeline, manager, aggregator, persistence, worker_builder)
    }

    /// Spawn the three threads; on a spawn failure the threads already
    /// running are stopped and joined before the error is returned
    fn launch<B>(
        pipeline: Pipeline,
        manager: ConnectionManager,
        aggregator: Aggregator<N>,
        persistence: PersistenceWorker<B>,
        builder: impl Fn(&'static str) -> thread::Builder,
    ) -> GatewayResult<Self>
    where
        B: StorageBackend + 'static,
    {
        let local_addr = manager.local_addr();
        let connmgr = spawn_worker(builder("connmgr"), "connmgr", &pipeline, move || manager.run())?;

        let consumer = pipeline.clone();
        let datamgr = match spawn_worker(builder("datamgr"), "datamgr", &pipeline, move || {
            aggregator.run(consumer)
        }) {
            Ok(handle) => handle,
            Err(e) => {
                join_started("connmgr", connmgr);
                return Err(e);
            }
        };

        let consumer = pipeline.clone();
        let storagemgr = match spawn_worker(builder("storagemgr"), "storagemgr", &pipeline, move || {
            persistence.run(consumer)
        }) {
            Ok(handle) => handle,
            Err(e) => {
                join_started("connmgr", connmgr);
                join_started("datamgr", datamgr);
                return Err(e);
            }
        };

        Ok(Self {
            pipeline,
            local_addr,
            connmgr,
            datamgr,
            storagemgr,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared pipeline handle
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Request an orderly stop; [`join`](Self::join) still has to be called
    pub fn shutdown(&self) {
        if self.pipeline.request_shutdown() {
            info!("Shutdown requested");
        }
    }

    /// Request shutdown and join, as [`shutdown`](Self::shutdown) followed by
    /// [`join`](Self::join)
    pub fn stop(self) -> GatewayResult<GatewayReport<N>> {
        self.shutdown();
        self.join()
    }

    /// Wait for all three threads and collect their reports
    ///
    /// Every thread is joined before any error is returned. When several
    /// fail, the connection manager's error wins over the aggregator's,
    /// which wins over storage.
    pub fn join(self) -> GatewayResult<GatewayReport<N>> {
        let connections = join_worker("connmgr", self.connmgr);
        let aggregator = join_worker("datamgr", self.datamgr);
        let persistence = join_worker("storagemgr", self.storagemgr);

        Ok(GatewayReport {
            connections: connections??,
            aggregator: aggregator?,
            persistence: persistence??,
        })
    }
}

impl<const N: usize> std::fmt::Debug for Gateway<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("local_addr", &self.local_addr)
            .field("shutdown", &self.pipeline.is_shutdown())
            .finish()
    }
}
