//! Storage Constants

/// Reconnect attempts after the storage connection is lost.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

/// Fixed pause between reconnect attempts (milliseconds).
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5000;
