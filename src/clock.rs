//! Wall-clock source for cache timestamps.
//!
//! Expiry decisions read the time through [`Clock`] so tests can move time
//! by hand instead of sleeping. Timestamps are truncated to milliseconds,
//! the precision of the persisted `cached_at` field.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_millis(Utc::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at `epoch_ms` milliseconds after the Unix epoch.
    pub fn at_millis(epoch_ms: i64) -> Self {
        Self {
            now: Mutex::new(from_millis(epoch_ms).unwrap_or_default()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::milliseconds(duration_millis(by));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = truncate_millis(to);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_millis(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Drop sub-millisecond precision.
pub fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(t.timestamp_millis()).unwrap_or(t)
}

/// Timestamp from milliseconds since the Unix epoch.
pub fn from_millis(epoch_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(epoch_ms).single()
}

/// Saturating conversion of a `Duration` to whole milliseconds.
pub fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
