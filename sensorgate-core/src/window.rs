//! Running-Average Window
//!
//! Fixed-capacity sliding window over the most recent values of one sensor.
//! Capacity is a const generic so the whole window lives inline in the
//! sensor metadata, backed by `heapless::Deque`.
//!
//! ## Algorithm
//!
//! ```text
//! count < N : push, sum += v                 average = None
//! count = N : push, sum += v                 average = sum / N
//! full      : evict oldest e, push v,
//!             sum = sum - e + v              average = sum / N
//! ```
//!
//! The incremental sum keeps every update O(1). The average is only defined
//! once the window has filled; callers treat the undefined case as zero.

use heapless::Deque;

/// Sliding window of the last `N` values
#[derive(Debug, Clone)]
pub struct RunningWindow<const N: usize> {
    values: Deque<f64, N>,
    sum: f64,
}

impl<const N: usize> Default for RunningWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RunningWindow<N> {
    /// Create an empty window
    pub const fn new() -> Self {
        Self {
            values: Deque::new(),
            sum: 0.0,
        }
    }

    /// Push a value, evicting the oldest once full
    ///
    /// Returns the evicted value, if any.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.values.is_full() {
            self.values.pop_front()
        } else {
            None
        };
        if let Some(old) = evicted {
            self.sum -= old;
        }
        // Cannot fail: a slot was just freed or the window was not full
        let _ = self.values.push_back(value);
        self.sum += value;
        evicted
    }

    /// Mean of the window, `None` until `N` values were seen
    pub fn average(&self) -> Option<f64> {
        if N > 0 && self.values.is_full() {
            Some(self.sum / N as f64)
        } else {
            None
        }
    }

    /// Running sum of the values in the window
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Number of values currently held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no value was pushed yet
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check if the window reached its capacity
    pub fn is_full(&self) -> bool {
        self.values.is_full()
    }

    /// Values from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }
}
