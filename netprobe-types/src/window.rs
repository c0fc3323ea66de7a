//! Wall-clock aligned tumbling windows.

use chrono::{DateTime, TimeZone, Utc};

/// A tumbling window `[start, start + len)` on the wall clock.
///
/// Windows are aligned by truncating unix time to a multiple of the window
/// length, so a 60 second window always starts on a calendar minute. The end
/// boundary is exclusive: an instant equal to `end` belongs to the next
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowSpan {
    start_ms: i64,
    len_ms: i64,
}

impl WindowSpan {
    /// The window of length `len_ms` containing the unix instant `ts_ms`.
    ///
    /// # Panics
    ///
    /// Panics if `len_ms` is not positive.
    pub fn containing(ts_ms: i64, len_ms: i64) -> Self {
        assert!(len_ms > 0, "window length must be positive");
        Self {
            start_ms: ts_ms.div_euclid(len_ms) * len_ms,
            len_ms,
        }
    }

    /// The window of length `len_ms` containing `at`.
    pub fn containing_time(at: DateTime<Utc>, len_ms: i64) -> Self {
        Self::containing(at.timestamp_millis(), len_ms)
    }

    /// Start boundary in unix milliseconds (inclusive).
    pub const fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// End boundary in unix milliseconds (exclusive).
    pub const fn end_ms(&self) -> i64 {
        self.start_ms + self.len_ms
    }

    /// Window length in milliseconds.
    pub const fn len_ms(&self) -> i64 {
        self.len_ms
    }

    /// Start boundary as a calendar timestamp.
    pub fn start_time(&self) -> DateTime<Utc> {
        millis_to_time(self.start_ms)
    }

    /// End boundary as a calendar timestamp.
    pub fn end_time(&self) -> DateTime<Utc> {
        millis_to_time(self.end_ms())
    }

    /// Whether `ts_ms` falls inside `[start, end)`.
    pub const fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms < self.end_ms()
    }

    /// The window immediately after this one.
    pub const fn next(&self) -> Self {
        Self {
            start_ms: self.end_ms(),
            len_ms: self.len_ms,
        }
    }

    /// The instant this window may be finalized: `end + grace`.
    pub const fn finalize_at_ms(&self, grace_ms: i64) -> i64 {
        self.end_ms() + grace_ms
    }
}

fn millis_to_time(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
