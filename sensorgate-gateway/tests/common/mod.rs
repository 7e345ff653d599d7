//! Common utilities for gateway integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use sensorgate_connectors::manager::send_readings;
use sensorgate_connectors::storage::MemoryStore;
use sensorgate_core::sensor::SensorTable;
use sensorgate_core::Reading;
use sensorgate_gateway::{Gateway, GatewayConfig};

/// Window length used by the end-to-end tests
pub const WINDOW: usize = 3;

pub const BASE_TS: i64 = 1_700_000_000;

/// Defaults with short timeouts
pub fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.network.idle_timeout_secs = 1;
    config.storage.reconnect_backoff_ms = 5;
    config
}

/// Sensor 7 in room 3, sensor 15 in room 1
pub fn table() -> SensorTable<WINDOW> {
    SensorTable::from_map_str("3 7\n1 15\n").expect("valid map")
}

pub fn start(config: &GatewayConfig, store: MemoryStore) -> Gateway<WINDOW> {
    Gateway::start_with_table(
        "127.0.0.1:0".parse().unwrap(),
        config,
        table(),
        store,
    )
    .expect("gateway starts")
}

/// Stream readings to the gateway and close the connection
pub fn send(addr: SocketAddr, readings: &[Reading]) {
    let stream = send_readings(addr, readings).expect("sensor connects");
    drop(stream);
}

pub fn series(sensor_id: u16, values: &[f64]) -> Vec<Reading> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| Reading::new(sensor_id, value, BASE_TS + i as i64))
        .collect()
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
