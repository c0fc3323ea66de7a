//! # netprobe
//!
//! Active network measurement: an agent sends small probes at a fixed rate
//! to an echo responder, matches the echoes, and emits one record of
//! latency, jitter and loss per wall-clock window.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── agent ─────────────────────────────┐
//! │  send loop ──┐                                                  │
//! │              ├──▶ engine actor ──▶ emitter ──▶ stdout / file /  │
//! │  recv loop ──┤    (in-flight,                  tcp / nats       │
//! │              │     windows)                                     │
//! │  timer ──────┘                                                  │
//! └───────────┬───────────────────────────▲─────────────────────────┘
//!             │ probe                     │ echo
//!             ▼                           │
//!        ┌────────────── echo responder ──┴──┐
//!        └───────────────────────────────────┘
//! ```
//!
//! - **[`settings`]**: layered configuration (defaults, TOML file,
//!   `NETPROBE_*` environment)
//! - **[`cli`]**: command-line flags that override the settings
//! - **[`identity`]**: the persisted agent UUID
//! - **[`agent`]**: wires settings into a running
//!   [`netprobe_engine::Prober`] and its outputs
//! - **[`echo`]**: the stateless UDP/TCP echo responder
//!
//! The measurement itself lives in `netprobe-engine`; record types in
//! `netprobe-types`.

pub mod agent;
pub mod cli;
pub mod echo;
pub mod identity;
pub mod settings;

pub use settings::Settings;
