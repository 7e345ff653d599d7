//! Dual-Cursor Shared Buffer
//!
//! ## Overview
//!
//! The shared buffer sits between the connection manager (single producer)
//! and the two consumers: the aggregation worker and the persistence worker.
//! Every reading is delivered exactly once to each consumer, in arrival order,
//! and the two consumers may lag each other arbitrarily.
//!
//! ## Consumption Protocol
//!
//! Each entry carries one "consumed" flag per [`Consumer`]. An entry is only
//! reclaimed once both flags are set, and only from the head:
//!
//! ```text
//!            head                                   tail
//!             ↓                                      ↓
//! entries:  [A ✓✓] [B ✓✓] [C ✓·] [D ·✓] [E ··] [F ··]
//!             └──── reclaimed on next pass ────┘
//!                           │       │
//!   aggregator cursor ──────┘       │   (first unset flag in column 0: D)
//!   store cursor ───────────────────┘   (first unset flag in column 1: C)
//! ```
//!
//! Because both consumers read strictly in order, all entries consumed by a
//! consumer form a prefix of the queue. The first unread entry for consumer
//! `c` is therefore at position `len - unread[c]`, and no scan is needed.
//!
//! ## Locking
//!
//! One `parking_lot::RwLock` guards the whole structure. Inserts and
//! scan-and-mark take the write lock; counts take the read lock. Reclamation
//! happens lazily at the start of every insert and read, never in between.
//!
//! ## Usage Example
//!
//! ```rust
//! use sensorgate_core::{buffer::{Consumer, SharedBuffer}, Reading};
//!
//! let buffer = SharedBuffer::new();
//! buffer.insert(Reading::new(1, 20.5, 100));
//!
//! assert_eq!(buffer.unread_count_for(Consumer::Aggregator), 1);
//! let reading = buffer.next_unread_for(Consumer::Aggregator).unwrap();
//! assert_eq!(reading.sensor_id, 1);
//! assert_eq!(buffer.unread_count_for(Consumer::Aggregator), 0);
//! assert_eq!(buffer.unread_count_for(Consumer::Store), 1);
//! ```

use core::fmt;
use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::reading::Reading;

/// Readers of the shared buffer, one cursor each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consumer {
    /// Running-average worker
    Aggregator,
    /// Persistence worker
    Store,
}

impl Consumer {
    /// Both consumers, in cursor order
    pub const ALL: [Consumer; 2] = [Consumer::Aggregator, Consumer::Store];

    const fn column(self) -> usize {
        match self {
            Consumer::Aggregator => 0,
            Consumer::Store => 1,
        }
    }
}

impl fmt::Display for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consumer::Aggregator => f.write_str("aggregator"),
            Consumer::Store => f.write_str("store"),
        }
    }
}

/// A reading plus its per-consumer flags
#[derive(Debug, Clone, Copy)]
struct BufferEntry {
    reading: Reading,
    consumed: [bool; 2],
}

impl BufferEntry {
    fn fully_consumed(&self) -> bool {
        self.consumed.iter().all(|flag| *flag)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: VecDeque<BufferEntry>,
    unread: [usize; 2],
}

impl State {
    /// Drop every fully consumed entry at the head
    fn reclaim(&mut self) {
        while self.entries.front().is_some_and(BufferEntry::fully_consumed) {
            self.entries.pop_front();
        }
    }
}

/// Append-only reading queue with two independent cursors
///
/// Cloning is not provided; share it behind an `Arc`.
#[derive(Default)]
pub struct SharedBuffer {
    state: RwLock<State>,
}

impl SharedBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading at the tail
    pub fn insert(&self, reading: Reading) {
        let mut state = self.state.write();
        state.reclaim();
        state.entries.push_back(BufferEntry {
            reading,
            consumed: [false; 2],
        });
        for unread in state.unread.iter_mut() {
            *unread += 1;
        }
    }

    /// Mark and return the oldest reading this consumer has not seen
    pub fn next_unread_for(&self, consumer: Consumer) -> Option<Reading> {
        let column = consumer.column();
        let mut state = self.state.write();
        state.reclaim();

        let unread = state.unread[column];
        if unread == 0 {
            return None;
        }
        let position = state.entries.len() - unread;
        let entry = state.entries.get_mut(position)?;
        debug_assert!(!entry.consumed[column]);
        entry.consumed[column] = true;
        let reading = entry.reading;
        state.unread[column] -= 1;
        Some(reading)
    }

    /// Number of readings this consumer has yet to see
    pub fn unread_count_for(&self, consumer: Consumer) -> usize {
        self.state.read().unread[consumer.column()]
    }

    /// Entries physically held, including consumed ones awaiting reclamation
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check if the buffer holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("SharedBuffer")
            .field("entries", &state.entries.len())
            .field("unread_aggregator", &state.unread[0])
            .field("unread_store", &state.unread[1])
            .finish()
    }
}
