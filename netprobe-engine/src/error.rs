//! Error types for the measurement engine.
//!
//! Only [`ConfigError`] is fatal, and only at startup. Everything else is
//! logged by the engine and turned into a measurement (a lost probe) rather
//! than a fault.

use thiserror::Error;

use netprobe_types::SeqNo;

/// Invalid probe configuration, rejected before the prober starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Probe rate is zero, negative or not a number.
    #[error("probe rate must be a positive number of Hz, got {0}")]
    InvalidRate(f64),

    /// Window length is zero.
    #[error("window length must be at least one second")]
    EmptyWindow,

    /// Echo timeout is zero.
    #[error("echo timeout must be positive")]
    InvalidTimeout,

    /// Grace period does not fit inside one window.
    #[error("grace period ({grace_ms}ms) must be shorter than the window ({window_ms}ms)")]
    GraceTooLong { grace_ms: u128, window_ms: u128 },

    /// More probes could be outstanding than there are sequence numbers.
    #[error(
        "rate x timeout allows {outstanding} outstanding probes, \
         which does not fit in the 65536 sequence numbers"
    )]
    SequenceSpaceExhausted { outstanding: u64 },
}

/// In-flight table errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// A still-outstanding probe already uses this sequence number.
    #[error("sequence number {seq} is already in flight")]
    DuplicateSequence { seq: SeqNo },
}

/// Echo payloads that could not be attributed to one of our probes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not a probe frame.
    #[error("malformed echo payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A well-formed probe, but sent by a different agent.
    #[error("echo belongs to agent {0}")]
    ForeignAgent(String),
}

/// Probe transport failures.
#[cfg(feature = "tokio")]
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No TCP connection to the responder yet; one is being established.
    #[error("not connected to the echo responder")]
    NotConnected,

    /// The sending side is gone; no more echoes will arrive.
    #[error("transport shut down")]
    Shutdown,
}

/// Failures delivering a finalized record to an output.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to a file or socket failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The receiving side of a channel output is full or dropped.
    #[error("channel output unavailable: {0}")]
    Channel(String),

    /// An external publisher rejected the record.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The output did not accept the record in time.
    #[error("output timed out after {0:?}")]
    Timeout(std::time::Duration),
}
