//! Time management for the gateway
//!
//! Readings carry wall-clock epoch seconds, as sampled by the sensor node.
//! Idle deadlines inside the connection manager use monotonic `Instant`s
//! instead, so a clock adjustment on the gateway never expires a link early.
//!
//! The [`TimeSource`] trait lets tests pin the wall clock.

/// Timestamp in seconds since the Unix epoch
pub type Timestamp = i64;

/// Source of wall-clock time
pub trait TimeSource: Send + Sync {
    /// Current epoch seconds
    fn now(&self) -> Timestamp;
}

/// System clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        epoch_seconds()
    }
}

/// Fixed time source for testing
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    /// Clock stuck at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// Jump to `timestamp`
    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Move forward by `seconds`
    pub fn advance(&mut self, seconds: i64) {
        self.timestamp += seconds;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }
}

/// Current epoch seconds from the system clock
///
/// Returns 0 if the clock reads earlier than the epoch.
pub fn epoch_seconds() -> Timestamp {
    use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

    StdSystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_time_advances() {
        let mut time = FixedTime::new(1000);
        assert_eq!(time.now(), 1000);

        time.advance(5);
        assert_eq!(time.now(), 1005);

        time.set(42);
        assert_eq!(time.now(), 42);
    }

    #[test]
    fn system_time_is_after_2020() {
        assert!(SystemTime.now() > 1_577_836_800);
    }
}
