//! Pipeline Handle: Shared Buffer, Termination Flag and Consumer Signals
//!
//! ## Overview
//!
//! The [`Pipeline`] bundles every piece of state the three gateway threads
//! share. Each worker receives its own clone of the handle; nothing lives in
//! global state.
//!
//! ```text
//!                     ┌──────────────── Pipeline ────────────────┐
//! connection manager ─┤ publish() → SharedBuffer → notify signals │
//!                     │                                            │
//! aggregation worker ─┤ wait_for_work(Aggregator) / next_for(..)   │
//! persistence worker ─┤ wait_for_work(Store)      / next_for(..)   │
//!                     │                                            │
//!   any thread ───────┤ request_shutdown() → flag + wakers + notify│
//!                     └────────────────────────────────────────────┘
//! ```
//!
//! ## Wakeup Protocol
//!
//! Each consumer owns a [`ConsumerSignal`]: a mutex paired with a condition
//! variable. The consumer evaluates "unread data or shutdown" while holding
//! the signal's mutex and only then waits; the producer takes the same mutex
//! before notifying. A notify can therefore never slip in between the check
//! and the wait.
//!
//! Waits are additionally bounded by a slice so that a shutdown raised from a
//! context that cannot notify (a signal handler, say) is still observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::buffer::{Consumer, SharedBuffer};
use crate::reading::Reading;

/// Mutex and condition variable pair for one consumer
#[derive(Debug, Default)]
pub struct ConsumerSignal {
    lock: Mutex<()>,
    condvar: Condvar,
}

impl ConsumerSignal {
    /// Create a signal with no waiter
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `ready` holds
    ///
    /// `ready` runs under the signal's lock, so a [`notify`](Self::notify)
    /// issued after a failed check is never missed. Each individual wait is
    /// bounded by `slice`.
    pub fn wait_until<F>(&self, mut ready: F, slice: Duration)
    where
        F: FnMut() -> bool,
    {
        let mut guard = self.lock.lock();
        while !ready() {
            self.condvar.wait_for(&mut guard, slice);
        }
    }

    /// Wake every waiter
    pub fn notify(&self) {
        let _guard = self.lock.lock();
        self.condvar.notify_all();
    }
}

type Waker = Box<dyn Fn() + Send + Sync>;

/// Process-wide termination flag
///
/// Set once, never cleared. Callbacks registered with
/// [`on_request`](Self::on_request) run on the requesting thread, which lets
/// the connection manager break out of its readiness wait.
#[derive(Default)]
pub struct ShutdownFlag {
    requested: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

impl ShutdownFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and run every registered waker
    ///
    /// Returns `true` on the first request only.
    pub fn request(&self) -> bool {
        let first = !self.requested.swap(true, Ordering::AcqRel);
        if first {
            for wake in self.wakers.lock().iter() {
                wake();
            }
        }
        first
    }

    /// Check whether termination was requested
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Register a callback run when termination is requested
    ///
    /// Runs immediately if the flag is already set.
    pub fn on_request<F>(&self, wake: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut wakers = self.wakers.lock();
        if self.is_requested() {
            drop(wakers);
            wake();
            return;
        }
        wakers.push(Box::new(wake));
    }
}

impl core::fmt::Debug for ShutdownFlag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShutdownFlag")
            .field("requested", &self.is_requested())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Shared {
    buffer: SharedBuffer,
    shutdown: ShutdownFlag,
    signals: [ConsumerSignal; 2],
}

/// Cloneable handle to the state shared by the gateway threads
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    /// Create a pipeline with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Underlying shared buffer
    pub fn buffer(&self) -> &SharedBuffer {
        &self.shared.buffer
    }

    /// Termination flag
    pub fn shutdown(&self) -> &ShutdownFlag {
        &self.shared.shutdown
    }

    fn signal(&self, consumer: Consumer) -> &ConsumerSignal {
        match consumer {
            Consumer::Aggregator => &self.shared.signals[0],
            Consumer::Store => &self.shared.signals[1],
        }
    }

    /// Append a reading and wake every consumer with unread data
    pub fn publish(&self, reading: Reading) {
        self.shared.buffer.insert(reading);
        for consumer in Consumer::ALL {
            if self.shared.buffer.unread_count_for(consumer) > 0 {
                self.signal(consumer).notify();
            }
        }
    }

    /// Take the next reading for a consumer without blocking
    pub fn next_for(&self, consumer: Consumer) -> Option<Reading> {
        self.shared.buffer.next_unread_for(consumer)
    }

    /// Block until the consumer has unread data or termination is requested
    ///
    /// Returns `true` when there is data to drain. Returns `false` only once
    /// termination was requested and nothing is left unread, which is the
    /// consumer's cue to exit.
    pub fn wait_for_work(&self, consumer: Consumer, slice: Duration) -> bool {
        let buffer = &self.shared.buffer;
        let shutdown = &self.shared.shutdown;
        self.signal(consumer).wait_until(
            || buffer.unread_count_for(consumer) > 0 || shutdown.is_requested(),
            slice,
        );
        buffer.unread_count_for(consumer) > 0
    }

    /// Request termination and wake both consumers
    pub fn request_shutdown(&self) -> bool {
        let first = self.shared.shutdown.request();
        for consumer in Consumer::ALL {
            self.signal(consumer).notify();
        }
        first
    }

    /// Check whether termination was requested
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    const SLICE: Duration = Duration::from_millis(50);

    #[test]
    fn consumer_wakes_on_publish() {
        let pipeline = Pipeline::new();
        let consumer = pipeline.clone();
        let handle = thread::spawn(move || {
            assert!(consumer.wait_for_work(Consumer::Aggregator, Duration::from_secs(10)));
            consumer.next_for(Consumer::Aggregator)
        });

        thread::sleep(Duration::from_millis(20));
        pipeline.publish(Reading::new(3, 1.5, 9));
        assert_eq!(handle.join().unwrap(), Some(Reading::new(3, 1.5, 9)));
    }

    #[test]
    fn shutdown_releases_idle_consumer() {
        let pipeline = Pipeline::new();
        let consumer = pipeline.clone();
        let handle =
            thread::spawn(move || consumer.wait_for_work(Consumer::Store, Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(20));
        assert!(pipeline.request_shutdown());
        assert!(!pipeline.request_shutdown());
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn unread_data_outlives_shutdown() {
        let pipeline = Pipeline::new();
        pipeline.publish(Reading::new(1, 0.0, 0));
        pipeline.request_shutdown();

        assert!(pipeline.wait_for_work(Consumer::Aggregator, SLICE));
        assert!(pipeline.next_for(Consumer::Aggregator).is_some());
        assert!(!pipeline.wait_for_work(Consumer::Aggregator, SLICE));
    }

    #[test]
    fn wakers_run_once_and_late_registration_fires_immediately() {
        let flag = ShutdownFlag::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        flag.on_request(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        flag.request();
        flag.request();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&hits);
        flag.on_request(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
