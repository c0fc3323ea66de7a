//! The sequential measurement state machine.
//!
//! [`Engine`] owns the in-flight table, the open windows and the finalize
//! cursor. It never reads a clock: every call carries the instants it needs,
//! monotonic nanoseconds for round-trip times and wall-clock time for window
//! attribution. The async [`Prober`](crate::Prober) funnels all three
//! activities (send, receive, finalize) through a single owner of this type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use netprobe_types::{AggregateRecord, SeqNo, WindowSpan};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::ProbeConfig;
use crate::error::{ProtocolError, TrackerError};
use crate::schedule::{FinalizeScheduler, WindowState};
use crate::tracker::{InFlight, InFlightTracker, MatchOutcome};
use crate::window::WindowAccumulator;

/// What happened to one echo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EchoOutcome {
    /// Folded into `window` with the given round-trip time.
    Matched { window: WindowSpan, rtt_ms: f64 },
    /// No outstanding probe with this sequence number.
    Unknown,
    /// Echo of an earlier probe that used the same sequence number.
    Stale,
    /// Round-trip time exceeded the echo timeout.
    Late,
    /// The probe's window was already finalized.
    WindowClosed,
    /// Payload is not a probe frame.
    Malformed,
    /// Probe frame from another agent.
    Foreign,
}

/// Counters describing what the engine has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Probes charged to a window.
    pub sent: u64,
    /// Probes whose transmission failed.
    pub send_failures: u64,
    /// Registrations rejected because the sequence number was in flight.
    pub duplicate_sequences: u64,
    /// Echoes folded into a window.
    pub matched: u64,
    /// Echoes for unknown, expired or already-matched sequence numbers.
    pub unknown: u64,
    /// Echoes of an earlier wrap of the same sequence number.
    pub stale: u64,
    /// Echoes that arrived after the timeout or after their window closed.
    pub late: u64,
    /// Payloads that did not decode or belonged to another agent.
    pub protocol_errors: u64,
    /// In-flight entries evicted by the sweep.
    pub expired: u64,
    /// Records produced.
    pub windows_finalized: u64,
    /// Partial windows dropped instead of emitted.
    pub windows_discarded: u64,
}

/// Probe/echo measurement state for one agent.
///
/// A window that was already running when the engine started is partial:
/// it is finalized on schedule but its record is discarded, never emitted.
///
/// # Example
///
/// ```rust
/// use netprobe_engine::{codec, Engine, ProbeConfig};
/// use netprobe_types::{ProbeFrame, SeqNo};
/// use chrono::{TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2025, 9, 9, 12, 0, 0).unwrap();
/// let mut engine = Engine::new("agent-1", ProbeConfig::default(), start);
///
/// engine.on_send(SeqNo::new(0), 0, start).unwrap();
/// let echo = codec::encode(&ProbeFrame::new("agent-1", SeqNo::new(0), 0)).unwrap();
/// engine.on_echo(&echo, 1_500_000);
///
/// let records = engine.on_tick(start + chrono::Duration::seconds(62));
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].latency_avg_ms, 1.5);
/// ```
#[derive(Debug)]
pub struct Engine {
    agent_id: String,
    tracker: InFlightTracker,
    scheduler: FinalizeScheduler,
    windows: BTreeMap<WindowSpan, WindowAccumulator>,
    partial: Option<WindowSpan>,
    stats: EngineStats,
}

impl Engine {
    /// Create an engine that started at wall-clock `started_at`.
    pub fn new(agent_id: impl Into<String>, config: ProbeConfig, started_at: DateTime<Utc>) -> Self {
        let scheduler = FinalizeScheduler::new(started_at, config.window, config.grace);
        let first = scheduler.oldest_open();
        let partial = (started_at.timestamp_millis() > first.start_ms()).then_some(first);
        let capacity = config.max_outstanding() as usize + 1;

        Self {
            agent_id: agent_id.into(),
            tracker: InFlightTracker::new(config.timeout_ns(), capacity),
            scheduler,
            windows: BTreeMap::new(),
            partial,
            stats: EngineStats::default(),
        }
    }

    /// Agent identity embedded in every probe.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Charge a probe sent at `wall` to its window and track it.
    ///
    /// The probe is charged even if registration fails: it was (or is about
    /// to be) transmitted, and an untracked probe can only end up lost.
    pub fn on_send(
        &mut self,
        seq: SeqNo,
        sent_ns: u64,
        wall: DateTime<Utc>,
    ) -> Result<WindowSpan, TrackerError> {
        let window = self.charge_window(wall);
        self.windows.entry(window).or_default().record_sent();
        self.stats.sent += 1;

        if let Err(err) = self.tracker.register(seq, InFlight { sent_ns, window }) {
            self.stats.duplicate_sequences += 1;
            warn!(%seq, "probe registered while its sequence number is still in flight; rate x timeout is too high");
            return Err(err);
        }
        Ok(window)
    }

    /// A probe registered by [`on_send`](Self::on_send) never left the host.
    ///
    /// It stays charged as sent and will show up as lost.
    pub fn on_send_failed(&mut self, seq: SeqNo, sent_ns: u64) {
        self.stats.send_failures += 1;
        self.tracker.forget(seq, sent_ns);
    }

    /// Process one echoed payload received at monotonic `recv_ns`.
    pub fn on_echo(&mut self, payload: &[u8], recv_ns: u64) -> EchoOutcome {
        let frame = match codec::decode(payload) {
            Ok(frame) if frame.agent_id == self.agent_id => frame,
            Ok(frame) => {
                self.stats.protocol_errors += 1;
                let err = ProtocolError::ForeignAgent(frame.agent_id);
                debug!(error = %err, "discarding echo");
                return EchoOutcome::Foreign;
            }
            Err(err) => {
                self.stats.protocol_errors += 1;
                warn!(error = %err, len = payload.len(), "discarding echo");
                return EchoOutcome::Malformed;
            }
        };

        let seq = frame.seq_no();
        match self.tracker.match_echo(seq, frame.t_send_ns, recv_ns) {
            MatchOutcome::Matched { entry, rtt_ns } => {
                if self.scheduler.is_finalized(entry.window) {
                    self.stats.late += 1;
                    debug!(%seq, "echo arrived after its window was finalized");
                    return EchoOutcome::WindowClosed;
                }
                let rtt_ms = rtt_ns as f64 / 1e6;
                self.windows
                    .entry(entry.window)
                    .or_default()
                    .record_sample(rtt_ms);
                self.stats.matched += 1;
                EchoOutcome::Matched {
                    window: entry.window,
                    rtt_ms,
                }
            }
            MatchOutcome::Late { rtt_ns, .. } => {
                self.stats.late += 1;
                debug!(%seq, rtt_ms = rtt_ns as f64 / 1e6, "echo exceeded timeout");
                EchoOutcome::Late
            }
            MatchOutcome::Stale => {
                self.stats.stale += 1;
                debug!(%seq, "echo of an earlier wrap of this sequence number");
                EchoOutcome::Stale
            }
            MatchOutcome::Unknown => {
                self.stats.unknown += 1;
                debug!(%seq, "echo for unknown or expired probe");
                EchoOutcome::Unknown
            }
        }
    }

    /// Evict in-flight probes older than the echo timeout.
    pub fn sweep(&mut self, now_ns: u64) -> usize {
        let removed = self.tracker.sweep(now_ns);
        self.stats.expired += removed as u64;
        removed
    }

    /// Finalize every window whose `end + grace` has passed at `wall`.
    ///
    /// Records come out in window order. The partial first window is
    /// finalized like any other but dropped.
    pub fn on_tick(&mut self, wall: DateTime<Utc>) -> Vec<AggregateRecord> {
        let due = self.scheduler.due(wall);
        if due.len() > 1 {
            warn!(
                windows = due.len(),
                "finalize fell behind the wall clock; catching up"
            );
        }

        let mut records = Vec::with_capacity(due.len());
        for span in due {
            let window = self.windows.remove(&span).unwrap_or_default();
            if self.partial == Some(span) {
                self.partial = None;
                self.stats.windows_discarded += 1;
                info!(
                    window = %span.start_time(),
                    sent = window.sent(),
                    "discarding partial first window"
                );
                continue;
            }
            self.stats.windows_finalized += 1;
            records.push(window.finalize(&self.agent_id, span));
        }
        records
    }

    /// State of the window containing `at`, as seen at `now`.
    pub fn window_state(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> WindowState {
        self.scheduler.state_of(self.scheduler.window_for(at), now)
    }

    /// The accumulator for `span`, if anything was charged to it.
    pub fn window(&self, span: WindowSpan) -> Option<&WindowAccumulator> {
        self.windows.get(&span)
    }

    /// The in-flight table.
    pub fn tracker(&self) -> &InFlightTracker {
        &self.tracker
    }

    /// Counters so far.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// The window a send at `wall` is charged to.
    ///
    /// If the wall clock stepped back into an already-finalized window, the
    /// send goes to the oldest window that is still open instead.
    fn charge_window(&self, wall: DateTime<Utc>) -> WindowSpan {
        let window = self.scheduler.window_for(wall);
        if self.scheduler.is_finalized(window) {
            let oldest = self.scheduler.oldest_open();
            warn!(
                wall = %wall,
                window = %oldest.start_time(),
                "wall clock stepped back into a finalized window"
            );
            oldest
        } else {
            window
        }
    }
}
