//! # SensorGate Gateway
//!
//! Process-level pieces of the sensor gateway: configuration, the
//! asynchronous log sink, the two pipeline consumers and the [`Gateway`]
//! that wires them to a connection manager.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    sensorgate (binary)                        │
//! │   clap args → GatewayConfig::resolve → LogSink → Gateway      │
//! ├───────────────────────────────────────────────────────────────┤
//! │  connmgr (mio)  →  Pipeline / SharedBuffer  →  datamgr        │
//! │                                             →  storagemgr     │
//! ├───────────────────────────────────────────────────────────────┤
//! │  sensorgate-connectors: wire format, manager, storage         │
//! │  sensorgate-core: registry, buffer, sensor table, pipeline    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use sensorgate_connectors::storage::MemoryStore;
//! use sensorgate_gateway::{Gateway, GatewayConfig};
//!
//! let config = GatewayConfig::default();
//! let gateway: Gateway = Gateway::start(1234, &config, MemoryStore::new())?;
//! println!("listening on {}", gateway.local_addr());
//! let report = gateway.join()?;
//! println!("{} records received", report.connections.records);
//! # Ok::<(), sensorgate_gateway::GatewayError>(())
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod workers;

pub use config::{ConfigSource, GatewayConfig};
pub use errors::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayReport};
pub use logging::{LogSink, SinkLogger};
pub use workers::{Aggregator, PersistenceWorker};
