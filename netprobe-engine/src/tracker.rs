//! In-flight probe tracking.
//!
//! Every transmitted probe is registered here until its echo is matched or it
//! ages past the echo timeout. Sequence numbers wrap, so the table is keyed by
//! the 16-bit number and guarded against a reused number colliding with an
//! older probe that is still outstanding.

use std::collections::HashMap;

use netprobe_types::{SeqNo, WindowSpan};

use crate::error::TrackerError;

/// An outstanding probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    /// Monotonic send timestamp (ns).
    pub sent_ns: u64,
    /// The window the probe was charged to at send time.
    pub window: WindowSpan,
}

/// Result of looking up an echo in the in-flight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The echo belongs to an outstanding probe; the entry was removed.
    Matched { entry: InFlight, rtt_ns: u64 },
    /// No probe with this sequence number is outstanding (never sent,
    /// already matched, or swept).
    Unknown,
    /// The sequence number is outstanding, but for a newer probe: this is
    /// an echo of an earlier use of the same number. The entry is kept.
    Stale,
    /// The echo arrived after the echo timeout. The entry was removed and
    /// the probe counts as lost.
    Late { entry: InFlight, rtt_ns: u64 },
}

/// Table of probes awaiting their echo.
///
/// Memory is bounded by the sweep: nothing older than `timeout` survives a
/// sweep, so the table holds at most about `rate x (timeout + sweep interval)`
/// entries.
///
/// # Example
///
/// ```rust
/// use netprobe_engine::{InFlight, InFlightTracker, MatchOutcome};
/// use netprobe_types::{SeqNo, WindowSpan};
///
/// let mut tracker = InFlightTracker::new(2_000_000_000, 8);
/// let window = WindowSpan::containing(0, 60_000);
///
/// tracker.register(SeqNo::new(1), InFlight { sent_ns: 100, window }).unwrap();
/// let outcome = tracker.match_echo(SeqNo::new(1), 100, 1_000_100);
/// assert!(matches!(outcome, MatchOutcome::Matched { rtt_ns: 1_000_000, .. }));
/// assert!(tracker.is_empty());
/// ```
#[derive(Debug)]
pub struct InFlightTracker {
    entries: HashMap<u16, InFlight>,
    timeout_ns: u64,
}

impl InFlightTracker {
    /// Create a tracker. `capacity` is a sizing hint, typically
    /// `rate x timeout`.
    pub fn new(timeout_ns: u64, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            timeout_ns,
        }
    }

    /// Register a just-sent probe.
    ///
    /// Fails if an unexpired entry already holds this sequence number. An
    /// expired entry that has not been swept yet is silently replaced.
    pub fn register(&mut self, seq: SeqNo, entry: InFlight) -> Result<(), TrackerError> {
        if let Some(existing) = self.entries.get(&seq.get()) {
            let age = entry.sent_ns.saturating_sub(existing.sent_ns);
            if age <= self.timeout_ns {
                return Err(TrackerError::DuplicateSequence { seq });
            }
        }
        self.entries.insert(seq.get(), entry);
        Ok(())
    }

    /// Match an echo against the table.
    ///
    /// `sent_ns` is the send timestamp carried back inside the echo; it must
    /// equal the registered one for the echo to match.
    pub fn match_echo(&mut self, seq: SeqNo, sent_ns: u64, recv_ns: u64) -> MatchOutcome {
        let Some(existing) = self.entries.get(&seq.get()) else {
            return MatchOutcome::Unknown;
        };
        if existing.sent_ns != sent_ns {
            return MatchOutcome::Stale;
        }

        let entry = *existing;
        self.entries.remove(&seq.get());

        let rtt_ns = recv_ns.saturating_sub(entry.sent_ns);
        if rtt_ns > self.timeout_ns {
            MatchOutcome::Late { entry, rtt_ns }
        } else {
            MatchOutcome::Matched { entry, rtt_ns }
        }
    }

    /// Drop the entry for a probe whose transmission failed.
    ///
    /// Only removes the entry if it is the one registered at `sent_ns`.
    pub fn forget(&mut self, seq: SeqNo, sent_ns: u64) -> bool {
        match self.entries.get(&seq.get()) {
            Some(entry) if entry.sent_ns == sent_ns => {
                self.entries.remove(&seq.get());
                true
            }
            _ => false,
        }
    }

    /// Evict entries older than the echo timeout. Returns how many were
    /// removed.
    ///
    /// Evicted probes are not reported anywhere: they were charged as sent
    /// when transmitted and simply never become received.
    pub fn sweep(&mut self, now_ns: u64) -> usize {
        let before = self.entries.len();
        let timeout_ns = self.timeout_ns;
        self.entries
            .retain(|_, entry| now_ns.saturating_sub(entry.sent_ns) <= timeout_ns);
        before - self.entries.len()
    }

    /// Look at an outstanding entry without removing it.
    pub fn get(&self, seq: SeqNo) -> Option<&InFlight> {
        self.entries.get(&seq.get())
    }

    /// Number of outstanding probes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: u64 = 2_000_000_000;
    const MS: u64 = 1_000_000;

    fn window() -> WindowSpan {
        WindowSpan::containing(0, 60_000)
    }

    fn entry(sent_ns: u64) -> InFlight {
        InFlight {
            sent_ns,
            window: window(),
        }
    }

    #[test]
    fn match_removes_entry_and_reports_rtt() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(5), entry(10 * MS)).unwrap();

        let outcome = tracker.match_echo(SeqNo::new(5), 10 * MS, 13 * MS);
        assert_eq!(
            outcome,
            MatchOutcome::Matched {
                entry: entry(10 * MS),
                rtt_ns: 3 * MS
            }
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn second_echo_for_same_probe_is_unknown() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(5), entry(0)).unwrap();

        assert!(matches!(
            tracker.match_echo(SeqNo::new(5), 0, MS),
            MatchOutcome::Matched { .. }
        ));
        assert_eq!(tracker.match_echo(SeqNo::new(5), 0, 2 * MS), MatchOutcome::Unknown);
    }

    #[test]
    fn echo_for_never_sent_probe_is_unknown() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        assert_eq!(tracker.match_echo(SeqNo::new(9), 0, MS), MatchOutcome::Unknown);
    }

    #[test]
    fn duplicate_registration_within_timeout_fails() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(0), entry(0)).unwrap();

        let err = tracker.register(SeqNo::new(0), entry(TIMEOUT)).unwrap_err();
        assert_eq!(err, TrackerError::DuplicateSequence { seq: SeqNo::new(0) });
        // The original probe is still tracked
        assert_eq!(tracker.get(SeqNo::new(0)).unwrap().sent_ns, 0);
    }

    #[test]
    fn expired_entry_is_replaced_on_reuse() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(0), entry(0)).unwrap();

        tracker
            .register(SeqNo::new(0), entry(TIMEOUT + 1))
            .unwrap();
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get(SeqNo::new(0)).unwrap().sent_ns, TIMEOUT + 1);
    }

    #[test]
    fn stale_echo_of_previous_wrap_does_not_match() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(7), entry(5 * TIMEOUT)).unwrap();

        // Echo of the probe that used seq 7 one wrap earlier
        assert_eq!(
            tracker.match_echo(SeqNo::new(7), TIMEOUT, 5 * TIMEOUT + MS),
            MatchOutcome::Stale
        );
        assert_eq!(tracker.len(), 1);

        assert!(matches!(
            tracker.match_echo(SeqNo::new(7), 5 * TIMEOUT, 5 * TIMEOUT + MS),
            MatchOutcome::Matched { .. }
        ));
    }

    #[test]
    fn echo_beyond_timeout_is_late() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(1), entry(0)).unwrap();

        let outcome = tracker.match_echo(SeqNo::new(1), 0, TIMEOUT + 1);
        assert!(matches!(outcome, MatchOutcome::Late { rtt_ns, .. } if rtt_ns == TIMEOUT + 1));
        assert!(tracker.is_empty());
    }

    #[test]
    fn echo_exactly_at_timeout_still_matches() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(1), entry(0)).unwrap();

        assert!(matches!(
            tracker.match_echo(SeqNo::new(1), 0, TIMEOUT),
            MatchOutcome::Matched { .. }
        ));
    }

    #[test]
    fn sweep_evicts_only_expired_entries() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(1), entry(0)).unwrap();
        tracker.register(SeqNo::new(2), entry(MS)).unwrap();
        tracker.register(SeqNo::new(3), entry(TIMEOUT)).unwrap();

        let removed = tracker.sweep(TIMEOUT + MS);
        assert_eq!(removed, 1);
        assert!(tracker.get(SeqNo::new(1)).is_none());
        assert!(tracker.get(SeqNo::new(2)).is_some());
        assert!(tracker.get(SeqNo::new(3)).is_some());
    }

    #[test]
    fn swept_probe_echo_is_unknown() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(1), entry(0)).unwrap();
        tracker.sweep(3 * TIMEOUT);

        assert_eq!(
            tracker.match_echo(SeqNo::new(1), 0, 3 * TIMEOUT),
            MatchOutcome::Unknown
        );
    }

    #[test]
    fn wraparound_neighbours_do_not_collide() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(65535), entry(0)).unwrap();
        tracker.register(SeqNo::new(65535).next(), entry(MS)).unwrap();
        assert_eq!(tracker.len(), 2);

        assert!(matches!(
            tracker.match_echo(SeqNo::new(0), MS, 2 * MS),
            MatchOutcome::Matched { .. }
        ));
        assert!(matches!(
            tracker.match_echo(SeqNo::new(65535), 0, 2 * MS),
            MatchOutcome::Matched { .. }
        ));
    }

    #[test]
    fn forget_only_removes_matching_registration() {
        let mut tracker = InFlightTracker::new(TIMEOUT, 4);
        tracker.register(SeqNo::new(4), entry(100)).unwrap();

        assert!(!tracker.forget(SeqNo::new(4), 99));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.forget(SeqNo::new(4), 100));
        assert!(tracker.is_empty());
    }
}
