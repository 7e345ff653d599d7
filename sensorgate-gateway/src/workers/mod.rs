//! Pipeline Consumers
//!
//! Two workers drain the shared buffer, each through its own cursor:
//!
//! | Worker                          | Cursor                 | Thread       |
//! |---------------------------------|------------------------|--------------|
//! | [`Aggregator`]                  | `Consumer::Aggregator` | `datamgr`    |
//! | [`PersistenceWorker`]           | `Consumer::Store`      | `storagemgr` |
//!
//! Both follow the same loop: wait until there is unread data or termination
//! was requested with nothing left, take one reading, process it, repeat.
//! Termination is only honoured once the worker's cursor has caught up, so
//! no buffered reading is lost on an orderly shutdown.

pub mod aggregator;
pub mod persistence;

pub use aggregator::{Aggregator, AggregatorReport, AggregatorStats};
pub use persistence::{PersistenceReport, PersistenceSettings, PersistenceWorker};
