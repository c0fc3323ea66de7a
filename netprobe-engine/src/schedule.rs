//! Wall-clock finalize scheduling.
//!
//! Each window moves `Open -> AwaitingGrace -> Finalized`. The scheduler
//! keeps a cursor on the oldest window that has not been finalized; every
//! window before the cursor is closed for good.

use std::time::Duration;

use chrono::{DateTime, Utc};
use netprobe_types::WindowSpan;

/// Lifecycle state of a window relative to a wall-clock instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// The window span has not ended; probes are still charged to it.
    Open,
    /// The span has ended but the grace period is still running, or the
    /// deadline passed and the finalize tick has not been processed yet.
    /// Echoes of probes sent inside the span are still folded in.
    AwaitingGrace,
    /// Closed and emitted. Nothing more is attributed to it.
    Finalized,
}

/// Decides which windows are due for finalization.
///
/// # Example
///
/// ```rust
/// use netprobe_engine::FinalizeScheduler;
/// use chrono::{TimeZone, Utc};
/// use std::time::Duration;
///
/// let start = Utc.with_ymd_and_hms(2025, 9, 9, 12, 0, 0).unwrap();
/// let mut scheduler = FinalizeScheduler::new(start, Duration::from_secs(60), Duration::from_secs(2));
///
/// // 12:01:01 is inside the grace period of the 12:00 window
/// assert!(scheduler.due(start + chrono::Duration::seconds(61)).is_empty());
///
/// // 12:01:02 finalizes it
/// let due = scheduler.due(start + chrono::Duration::seconds(62));
/// assert_eq!(due.len(), 1);
/// assert_eq!(due[0].start_time(), start);
/// ```
#[derive(Debug, Clone)]
pub struct FinalizeScheduler {
    len_ms: i64,
    grace_ms: i64,
    cursor: WindowSpan,
}

impl FinalizeScheduler {
    /// Start scheduling from the window containing `started_at`.
    pub fn new(started_at: DateTime<Utc>, window: Duration, grace: Duration) -> Self {
        let len_ms = window.as_millis() as i64;
        Self {
            len_ms,
            grace_ms: grace.as_millis() as i64,
            cursor: WindowSpan::containing_time(started_at, len_ms),
        }
    }

    /// The window containing `at` (end-exclusive).
    pub fn window_for(&self, at: DateTime<Utc>) -> WindowSpan {
        WindowSpan::containing_time(at, self.len_ms)
    }

    /// The oldest window that has not been finalized.
    pub fn oldest_open(&self) -> WindowSpan {
        self.cursor
    }

    /// Whether `span` has already been finalized.
    pub fn is_finalized(&self, span: WindowSpan) -> bool {
        span.start_ms() < self.cursor.start_ms()
    }

    /// State of `span` as seen at `now`.
    pub fn state_of(&self, span: WindowSpan, now: DateTime<Utc>) -> WindowState {
        if self.is_finalized(span) {
            WindowState::Finalized
        } else if now.timestamp_millis() < span.end_ms() {
            WindowState::Open
        } else {
            WindowState::AwaitingGrace
        }
    }

    /// Windows whose `end + grace` deadline has passed at `now`, oldest
    /// first. They are considered finalized from here on.
    ///
    /// More than one window is returned when the caller fell behind (for
    /// example after the process was suspended).
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<WindowSpan> {
        let now_ms = now.timestamp_millis();
        let mut due = Vec::new();
        while self.cursor.finalize_at_ms(self.grace_ms) <= now_ms {
            due.push(self.cursor);
            self.cursor = self.cursor.next();
        }
        due
    }

    /// When the oldest open window becomes due.
    pub fn next_deadline_ms(&self) -> i64 {
        self.cursor.finalize_at_ms(self.grace_ms)
    }
}

/// The next finalize deadline after `now_ms`, computed from the clock alone.
///
/// Used by the timer task, which does not share the engine's cursor: right
/// after a boundary the previous window's grace is still running, otherwise
/// the current window's `end + grace` is next.
pub fn next_finalize_deadline(now_ms: i64, len_ms: i64, grace_ms: i64) -> i64 {
    let current = WindowSpan::containing(now_ms, len_ms);
    let previous_deadline = current.start_ms() + grace_ms;
    if now_ms < previous_deadline {
        previous_deadline
    } else {
        current.finalize_at_ms(grace_ms)
    }
}
