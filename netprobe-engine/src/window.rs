//! Per-window accumulation of latency, jitter and loss.

use netprobe_types::{AggregateRecord, WindowSpan};

/// Running min/max/sum over a stream of millisecond values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl Summary {
    /// Fold one value in.
    pub fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    /// Smallest value, 0 when empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value, 0 when empty.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Mean value, 0 when empty.
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Number of values folded in.
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Statistics for one tumbling window while it is open or awaiting grace.
///
/// `sent` is charged when a probe is transmitted; `received` only grows
/// from matched echoes of probes charged to this same window, so
/// `received <= sent` holds by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowAccumulator {
    sent: u64,
    received: u64,
    latency: Summary,
    jitter: Summary,
    previous_rtt: Option<f64>,
}

impl WindowAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge one transmitted probe to this window.
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Fold in the round-trip time of one matched echo.
    ///
    /// Jitter is the absolute difference to the previous sample of this
    /// window, so the first sample contributes latency only.
    pub fn record_sample(&mut self, rtt_ms: f64) {
        self.received += 1;
        self.latency.observe(rtt_ms);
        if let Some(previous) = self.previous_rtt {
            self.jitter.observe((rtt_ms - previous).abs());
        }
        self.previous_rtt = Some(rtt_ms);
    }

    /// Probes charged so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Echoes matched so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Latency summary.
    pub fn latency(&self) -> &Summary {
        &self.latency
    }

    /// Jitter summary.
    pub fn jitter(&self) -> &Summary {
        &self.jitter
    }

    /// Number of jitter points (one less than `received`, once non-empty).
    pub fn jitter_samples(&self) -> u64 {
        self.jitter.count()
    }

    /// Close the window and produce its record.
    pub fn finalize(self, agent_id: &str, span: WindowSpan) -> AggregateRecord {
        AggregateRecord::builder(agent_id, span.start_time())
            .latency(self.latency.min(), self.latency.max(), self.latency.avg())
            .jitter(self.jitter.min(), self.jitter.max(), self.jitter.avg())
            .counts(self.sent, self.received)
            .build()
    }
}
