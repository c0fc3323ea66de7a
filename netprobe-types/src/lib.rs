//! # netprobe-types
//!
//! Core types shared by every part of netprobe: the probe frame that travels
//! to the echo responder and back, the tumbling window a probe is charged to,
//! and the aggregate record emitted once a window is finalized.
//!
//! ## Design Goals
//!
//! - **Stable record schema**: [`AggregateRecord`] serializes with exactly the
//!   field names downstream storage and charting depend on
//! - **Optional serialization**: Enable the `serde` feature as needed
//! - **Two clocks, kept apart**: [`WindowSpan`] is wall-clock (unix millis),
//!   [`ProbeFrame::t_send_ns`] is monotonic nanoseconds
//!
//! ## Features
//!
//! - `serde`: JSON serialization via serde
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use netprobe_types::{AggregateRecord, WindowSpan};
//!
//! // 12:34:56.789 UTC on 2025-09-09 lands in the 12:34 minute
//! let span = WindowSpan::containing(1_757_421_296_789, 60_000);
//! assert_eq!(span.start_ms() % 60_000, 0);
//!
//! let record = AggregateRecord::builder("agent-1", span.start_time())
//!     .latency(1.0, 1.2, 1.1)
//!     .jitter(0.1, 0.2, 0.15)
//!     .counts(60, 58)
//!     .build();
//!
//! assert_eq!(record.lost, 2);
//! assert_eq!(record.time_label(), "2025-09-09T12:34:00Z");
//! ```

mod probe;
mod record;
mod window;

pub use probe::*;
pub use record::*;
pub use window::*;

/// Number of distinct probe sequence numbers before wraparound.
pub const SEQ_SPACE: u32 = 1 << 16;

/// Round a millisecond value to three decimal places (microsecond precision).
pub fn round_ms(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
