//! # netprobe-engine
//!
//! Measures round-trip latency, jitter and packet loss between an agent and
//! an echo responder, aggregated into fixed wall-clock windows.
//!
//! The crate has two layers:
//!
//! - [`Engine`]: a synchronous state machine that tracks in-flight probes,
//!   accumulates per-window statistics and finalizes windows once their
//!   grace period has passed. It never reads a clock, which makes it easy
//!   to drive from tests.
//! - [`Prober`] (feature `tokio`): the running service. It sends probes at a
//!   fixed rate, receives echoes over UDP or TCP, and emits one
//!   [`AggregateRecord`] per window to the configured [`Output`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netprobe_engine::{Output, Prober, ProbeConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ProbeConfig::builder()
//!         .rate_hz(2.0)
//!         .window(Duration::from_secs(60))
//!         .build()
//!         .unwrap();
//!
//!     let handle = Prober::builder("agent-1", "echo.example.net:7")
//!         .config(config)
//!         .output(Output::file("records.jsonl"))
//!         .build()
//!         .unwrap()
//!         .start()
//!         .await
//!         .unwrap();
//!
//!     tokio::time::sleep(Duration::from_secs(300)).await;
//!     handle.stop().await;
//! }
//! ```

pub mod codec;
mod config;
mod engine;
pub mod error;
mod schedule;
mod tracker;
mod window;

#[cfg(feature = "tokio")]
mod output;
#[cfg(feature = "tokio")]
mod prober;
#[cfg(feature = "tokio")]
pub mod transport;

pub use config::{ProbeConfig, ProbeConfigBuilder};
pub use engine::{EchoOutcome, Engine, EngineStats};
pub use error::{ConfigError, ProtocolError, SinkError, TrackerError};
pub use schedule::{next_finalize_deadline, FinalizeScheduler, WindowState};
pub use tracker::{InFlight, InFlightTracker, MatchOutcome};
pub use window::{Summary, WindowAccumulator};

#[cfg(feature = "tokio")]
pub use error::TransportError;
#[cfg(feature = "tokio")]
pub use output::{Output, RecordSink};
#[cfg(feature = "tokio")]
pub use prober::{Prober, ProberBuilder, ProberHandle, ProberStats};
#[cfg(feature = "tokio")]
pub use transport::TransportKind;

// Re-export types for convenience
pub use netprobe_types::{AggregateRecord, ProbeFrame, SeqNo, WindowSpan};

#[cfg(feature = "tokio")]
pub use async_trait::async_trait;
