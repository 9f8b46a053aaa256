//! Time utilities.
//!
//! Re-exports Tokio's timer primitives together with `std::time` types so
//! callers only ever import from `core_async::time`.

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

/// Milliseconds since the Unix epoch, saturating to zero if the system clock
/// is set before 1970.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
