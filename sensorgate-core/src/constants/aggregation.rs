//! Aggregation Constants

/// Number of recent readings in each sensor's running average.
///
/// Sizes `RunningWindow<RUN_AVG_LENGTH>` inline in every `SensorMeta`.
pub const RUN_AVG_LENGTH: usize = 5;

/// Default lower alert threshold on the running average (°C).
pub const DEFAULT_MIN_TEMP: f64 = 18.0;

/// Default upper alert threshold on the running average (°C).
pub const DEFAULT_MAX_TEMP: f64 = 25.0;
