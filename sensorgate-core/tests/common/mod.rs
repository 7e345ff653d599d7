//! Common test utilities for the core integration tests
//!
//! - Deterministic reading generators
//! - Small operation models for property tests

#![allow(dead_code)]

use sensorgate_core::{Reading, SensorId, Timestamp};

/// Epoch seconds used as the start of generated series
pub const BASE_TS: Timestamp = 1_700_000_000;

/// One reading per sensor id, timestamps one second apart
pub fn readings_for(ids: &[SensorId]) -> Vec<Reading> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| Reading::new(*id, 20.0 + i as f64 * 0.25, BASE_TS + i as Timestamp))
        .collect()
}

/// `count` readings from a single sensor, values following `f(i)`
pub fn series(sensor_id: SensorId, count: usize, f: impl Fn(usize) -> f64) -> Vec<Reading> {
    (0..count)
        .map(|i| Reading::new(sensor_id, f(i), BASE_TS + i as Timestamp))
        .collect()
}

/// Reference model of the registry clamping rules on a plain `Vec`
#[derive(Debug, Default, Clone)]
pub struct VecModel(pub Vec<i32>);

impl VecModel {
    pub fn insert(&mut self, value: i32, index: isize) {
        let at = if index <= 0 {
            0
        } else {
            (index as usize).min(self.0.len())
        };
        self.0.insert(at, value);
    }

    pub fn clamp(&self, index: isize) -> Option<usize> {
        if self.0.is_empty() {
            None
        } else if index <= 0 {
            Some(0)
        } else {
            Some((index as usize).min(self.0.len() - 1))
        }
    }

    pub fn remove(&mut self, index: isize) -> Option<i32> {
        let at = self.clamp(index)?;
        Some(self.0.remove(at))
    }

    pub fn get(&self, index: isize) -> Option<i32> {
        self.clamp(index).map(|at| self.0[at])
    }
}
