//! Probe frames and sequence numbers.

use core::fmt;

/// A probe sequence number.
///
/// Sequence numbers are 16 bits wide and wrap from 65535 back to 0, so the
/// same number is reused every 65536 probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SeqNo(pub u16);

impl SeqNo {
    /// Create a sequence number.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// The raw value.
    pub const fn get(self) -> u16 {
        self.0
    }

    /// The following sequence number, wrapping at 65536.
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u16> for SeqNo {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outbound probe, exactly as it travels to the echo responder.
///
/// The responder returns the bytes unmodified, so everything needed to match
/// the echo is carried inside the frame: the sending agent, the sequence
/// number and the monotonic send timestamp.
///
/// # Example
///
/// ```rust
/// use netprobe_types::{ProbeFrame, SeqNo};
///
/// let frame = ProbeFrame::new("agent-1", SeqNo::new(7), 1_000_000);
/// assert_eq!(frame.seq_no(), SeqNo::new(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeFrame {
    /// Identity of the agent that sent the probe.
    pub agent_id: String,

    /// Sequence number (wraps modulo 2^16).
    pub seq: u16,

    /// Monotonic send timestamp in nanoseconds, relative to the sender's
    /// process clock origin. Meaningless to anyone but the sender.
    pub t_send_ns: u64,
}

impl ProbeFrame {
    /// Create a probe frame.
    pub fn new(agent_id: impl Into<String>, seq: SeqNo, t_send_ns: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            seq: seq.get(),
            t_send_ns,
        }
    }

    /// The sequence number as a [`SeqNo`].
    pub fn seq_no(&self) -> SeqNo {
        SeqNo(self.seq)
    }
}
