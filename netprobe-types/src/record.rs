//! The aggregate record produced when a window is finalized.

use chrono::{DateTime, Utc};

use crate::round_ms;

/// Format of the `time` field: the window start, ISO-8601 UTC.
///
/// Windows are calendar aligned, so for any window length that is a multiple
/// of one minute the seconds are always `00`.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Path-quality statistics for one finalized window.
///
/// The field names are a stable contract: persistence and visualization key
/// on them directly, so they must not be renamed.
///
/// # Example
///
/// ```rust
/// use netprobe_types::AggregateRecord;
/// use chrono::{TimeZone, Utc};
///
/// let minute = Utc.with_ymd_and_hms(2025, 9, 9, 12, 34, 0).unwrap();
/// let record = AggregateRecord::builder("agent-1", minute)
///     .latency(0.8, 2.4, 1.3)
///     .counts(120, 117)
///     .build();
///
/// assert_eq!(record.lost, 3);
/// assert_eq!(record.jitter_avg_ms, 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AggregateRecord {
    /// Identity of the agent that measured the window.
    pub agent_id: String,

    /// Window start.
    ///
    /// Serialized with [`TIME_FORMAT`], which keeps seconds. The label is
    /// truncated to the minute only when the window length is a multiple of
    /// 60 seconds; shorter windows carry their exact start second.
    #[cfg_attr(feature = "serde", serde(with = "window_time"))]
    pub time: DateTime<Utc>,

    /// Smallest round-trip time in the window.
    pub latency_min_ms: f64,

    /// Largest round-trip time in the window.
    pub latency_max_ms: f64,

    /// Mean round-trip time, 0 when nothing was received.
    pub latency_avg_ms: f64,

    /// Smallest difference between consecutive round-trip times.
    pub jitter_min_ms: f64,

    /// Largest difference between consecutive round-trip times.
    pub jitter_max_ms: f64,

    /// Mean jitter, 0 when fewer than two samples were received.
    pub jitter_avg_ms: f64,

    /// Probes charged to this window.
    pub sent: u64,

    /// Echoes matched into this window.
    pub received: u64,

    /// `sent - received`, never negative.
    pub lost: u64,
}

impl AggregateRecord {
    /// Create a builder for a record.
    pub fn builder(agent_id: impl Into<String>, time: DateTime<Utc>) -> AggregateRecordBuilder {
        AggregateRecordBuilder::new(agent_id, time)
    }

    /// The `time` field exactly as it is serialized.
    pub fn time_label(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }

    /// Fraction of sent probes that were lost, 0 when nothing was sent.
    pub fn loss_ratio(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64
        }
    }
}

/// Builder for [`AggregateRecord`].
///
/// Millisecond values are rounded to three decimals and `lost` is derived
/// from the counts.
#[derive(Debug)]
pub struct AggregateRecordBuilder {
    agent_id: String,
    time: DateTime<Utc>,
    latency: (f64, f64, f64),
    jitter: (f64, f64, f64),
    sent: u64,
    received: u64,
}

impl AggregateRecordBuilder {
    /// Create a new builder with zeroed statistics.
    pub fn new(agent_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            time,
            latency: (0.0, 0.0, 0.0),
            jitter: (0.0, 0.0, 0.0),
            sent: 0,
            received: 0,
        }
    }

    /// Set latency min/max/avg in milliseconds.
    pub fn latency(mut self, min: f64, max: f64, avg: f64) -> Self {
        self.latency = (min, max, avg);
        self
    }

    /// Set jitter min/max/avg in milliseconds.
    pub fn jitter(mut self, min: f64, max: f64, avg: f64) -> Self {
        self.jitter = (min, max, avg);
        self
    }

    /// Set the sent and received counts.
    pub fn counts(mut self, sent: u64, received: u64) -> Self {
        self.sent = sent;
        self.received = received;
        self
    }

    /// Build the record.
    pub fn build(self) -> AggregateRecord {
        AggregateRecord {
            agent_id: self.agent_id,
            time: self.time,
            latency_min_ms: round_ms(self.latency.0),
            latency_max_ms: round_ms(self.latency.1),
            latency_avg_ms: round_ms(self.latency.2),
            jitter_min_ms: round_ms(self.jitter.0),
            jitter_max_ms: round_ms(self.jitter.1),
            jitter_avg_ms: round_ms(self.jitter.2),
            sent: self.sent,
            received: self.received,
            // received can only grow from matches of probes charged here,
            // the floor only guards against a broken caller
            lost: self.sent.saturating_sub(self.received),
        }
    }
}

#[cfg(feature = "serde")]
mod window_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
