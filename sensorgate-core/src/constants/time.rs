//! Time-Related Constants

/// Longest a consumer sleeps on its signal before re-checking the
/// termination flag (milliseconds).
///
/// Wakeups are never lost; the slice only bounds how long a consumer
/// takes to notice a shutdown requested without a notify.
pub const CONSUMER_WAIT_SLICE_MS: u64 = 500;
