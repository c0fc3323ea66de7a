//! # netprobe-adapters
//!
//! Publishers that deliver finalized netprobe records to message buses.
//!
//! Each adapter implements [`netprobe_engine::RecordSink`], so it plugs into
//! a prober as an [`netprobe_engine::Output::Sink`].
//!
//! ## Supported Systems
//!
//! - **NATS** (`nats` feature) - Publishes each record as JSON on
//!   `<prefix>.<agent_id>.minute`
//!
//! ## Quick Start (NATS)
//!
//! ```rust,no_run
//! # #[cfg(feature = "nats")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use netprobe_adapters::nats::NatsPublisher;
//! use netprobe_engine::{Output, Prober};
//!
//! let publisher = NatsPublisher::builder()
//!     .url("nats://localhost:4222")
//!     .subject_prefix("netstats")
//!     .build()
//!     .await?;
//!
//! let handle = Prober::builder("agent-1", "echo.example.net:7")
//!     .output(Output::sink(publisher))
//!     .build()?
//!     .start()
//!     .await?;
//! # handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod error;

#[cfg(feature = "nats")]
pub mod nats;

pub use error::AdapterError;

// Re-export types for convenience
pub use netprobe_types::AggregateRecord;
