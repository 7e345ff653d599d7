//! Common utilities for connector integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sensorgate_connectors::manager::{ConnectionManager, ManagerConfig};
use sensorgate_connectors::{ConnectionStats, ConnectorResult};
use sensorgate_core::{Consumer, Pipeline, Reading};

/// A connection manager running on its own thread
pub struct RunningManager {
    pub addr: SocketAddr,
    pub pipeline: Pipeline,
    pub handle: JoinHandle<ConnectorResult<ConnectionStats>>,
}

impl RunningManager {
    pub fn start(idle_timeout: Duration) -> Self {
        Self::start_with_capture(idle_timeout, None)
    }

    pub fn start_with_capture(idle_timeout: Duration, capture_path: Option<PathBuf>) -> Self {
        let pipeline = Pipeline::new();
        let config = ManagerConfig {
            idle_timeout,
            capture_path,
        };
        let manager = ConnectionManager::bind(
            "127.0.0.1:0".parse().unwrap(),
            pipeline.clone(),
            config,
        )
        .expect("bind test listener");
        let addr = manager.local_addr();
        let handle = thread::Builder::new()
            .name("connmgr-test".into())
            .spawn(move || manager.run())
            .unwrap();
        Self {
            addr,
            pipeline,
            handle,
        }
    }

    /// Request shutdown and collect the statistics
    pub fn stop(self) -> ConnectionStats {
        self.pipeline.request_shutdown();
        self.join()
    }

    pub fn join(self) -> ConnectionStats {
        self.handle
            .join()
            .expect("manager thread panicked")
            .expect("manager failed")
    }

    /// Every reading currently unread by `consumer`
    pub fn drain(&self, consumer: Consumer) -> Vec<Reading> {
        std::iter::from_fn(|| self.pipeline.next_for(consumer)).collect()
    }
}

/// Poll `condition` until it holds or `limit` elapses
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

pub fn readings(sensor_id: u16, count: usize) -> Vec<Reading> {
    (0..count)
        .map(|i| Reading::new(sensor_id, 20.0 + i as f64, 1_700_000_000 + i as i64))
        .collect()
}
