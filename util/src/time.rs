//! General time utility functions

use chrono;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if the nanosecond count overflows
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Build a `std::time::Duration` from a parameter given in seconds.
///
/// Negative or non-finite values are treated as zero.
pub fn secs_to_duration(secs: f64) -> std::time::Duration {
    if secs.is_finite() && secs > 0.0 {
        std::time::Duration::from_secs_f64(secs)
    } else {
        std::time::Duration::from_secs(0)
    }
}

/// Build a period from a parameter given in seconds.
///
/// Returns `None` unless the period is finite and at least one nanosecond long.
pub fn period_from_secs(secs: f64) -> Option<std::time::Duration> {
    let period = secs_to_duration(secs);

    if period > std::time::Duration::from_secs(0) {
        Some(period)
    } else {
        None
    }
}
