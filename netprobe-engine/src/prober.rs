//! The running prober: send, receive and finalize loops around one [`Engine`].
//!
//! The three activities run concurrently but never touch measurement state
//! directly. Each one sends a [`Command`] to a single actor task that owns
//! the [`Engine`], so every state transition happens in one place and in
//! arrival order. Finalized records flow from the actor to an emitter task,
//! which feeds the outputs one record at a time.
//!
//! The probe clock never waits on the transport: each tick is charged as
//! sent and handed to a separate transmit task through a short queue. A
//! probe that finds the queue full is counted as a failed send.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use netprobe_types::{AggregateRecord, ProbeFrame, SeqNo};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::codec;
use crate::config::ProbeConfig;
use crate::engine::{EchoOutcome, Engine, EngineStats};
use crate::error::{ConfigError, SinkError, TransportError};
use crate::output::Output;
use crate::schedule::next_finalize_deadline;
use crate::transport::{self, ProbeReceiver, ProbeSender, TransportKind};

/// Commands buffered between the loops and the engine actor.
const COMMAND_BUFFER: usize = 1024;

/// Probes queued between the probe clock and the transmit task.
const TRANSMIT_BUFFER: usize = 64;

/// Longest time one output may take to accept a record.
const EMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`ProberHandle::stop`] waits for each task before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause after a receive error before trying again.
const RECV_BACKOFF: Duration = Duration::from_millis(100);

/// Longest single sleep of the finalize timer, so wall-clock steps are
/// noticed promptly.
const MAX_TIMER_SLEEP: Duration = Duration::from_secs(1);

/// Monotonic nanoseconds since the prober started.
#[derive(Debug, Clone, Copy)]
struct MonoClock {
    origin: Instant,
}

impl MonoClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// An encoded probe waiting for the transport.
#[derive(Debug)]
struct Transmit {
    seq: SeqNo,
    sent_ns: u64,
    payload: Vec<u8>,
}

/// Work for the engine actor.
#[derive(Debug)]
enum Command {
    /// A probe is about to be transmitted.
    Sent {
        seq: SeqNo,
        sent_ns: u64,
        wall: DateTime<Utc>,
    },
    /// Transmission of a registered probe failed or was abandoned.
    SendFailed { seq: SeqNo, sent_ns: u64 },
    /// Bytes came back from the responder.
    Echo { payload: Vec<u8>, recv_ns: u64 },
    /// A finalize deadline passed.
    Tick { wall: DateTime<Utc> },
}

/// Counters of a running prober.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProberStats {
    /// Measurement counters.
    pub engine: EngineStats,
    /// Records handed to the outputs.
    pub records_emitted: u64,
    /// Records an output failed to accept.
    pub sink_failures: u64,
}

/// Measures latency, jitter and loss towards one echo responder.
///
/// # Example
///
/// ```rust,no_run
/// use netprobe_engine::{Output, Prober, ProbeConfig, TransportKind};
///
/// #[tokio::main]
/// async fn main() {
///     let prober = Prober::builder("agent-1", "echo.example.net:7")
///         .config(ProbeConfig::default())
///         .transport(TransportKind::Udp)
///         .output(Output::Stdout)
///         .build()
///         .unwrap();
///
///     let handle = prober.start().await.unwrap();
///     tokio::signal::ctrl_c().await.unwrap();
///     handle.stop().await;
/// }
/// ```
#[derive(Debug)]
pub struct Prober {
    agent_id: String,
    target: String,
    config: ProbeConfig,
    transport: TransportKind,
    outputs: Vec<Output>,
}

impl Prober {
    /// Create a builder for a prober identified as `agent_id`, probing the
    /// responder at `target` (`host:port`).
    pub fn builder(agent_id: impl Into<String>, target: impl Into<String>) -> ProberBuilder {
        ProberBuilder {
            agent_id: agent_id.into(),
            target: target.into(),
            config: ProbeConfig::default(),
            transport: TransportKind::default(),
            outputs: Vec::new(),
        }
    }

    /// Agent identity carried in every probe and record.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Open the transport and spawn the background tasks.
    ///
    /// Returns a handle that can be used to stop probing.
    pub async fn start(self) -> Result<ProberHandle, TransportError> {
        let (sender, receiver) = transport::open(self.transport, &self.target).await?;
        let clock = MonoClock::new();
        let engine = Engine::new(self.agent_id.clone(), self.config.clone(), Utc::now());

        let (stop_tx, stop_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (record_tx, record_rx) = mpsc::unbounded_channel();
        let (transmit_tx, transmit_rx) = mpsc::channel(TRANSMIT_BUFFER);
        let stats = Arc::new(Mutex::new(ProberStats::default()));

        info!(
            agent_id = %self.agent_id,
            target = %self.target,
            transport = %self.transport,
            rate_hz = self.config.rate_hz,
            window_secs = self.config.window.as_secs(),
            "prober starting"
        );

        let tasks = vec![
            tokio::spawn(run_engine(
                engine,
                command_rx,
                record_tx,
                clock,
                self.config.sweep_interval,
                stats.clone(),
            )),
            tokio::spawn(send_loop(
                self.agent_id,
                self.config.period(),
                clock,
                transmit_tx,
                command_tx.clone(),
                stop_rx.clone(),
            )),
            tokio::spawn(transmit_loop(
                sender,
                transmit_rx,
                command_tx.clone(),
                stop_rx.clone(),
            )),
            tokio::spawn(receive_loop(
                receiver,
                clock,
                command_tx.clone(),
                stop_rx.clone(),
            )),
            tokio::spawn(finalize_timer(
                self.config.window_ms(),
                self.config.grace_ms(),
                command_tx,
                stop_rx,
            )),
            tokio::spawn(emit_records(record_rx, self.outputs, stats.clone())),
        ];

        Ok(ProberHandle {
            stop_tx,
            tasks,
            stats,
        })
    }
}

/// Builder for configuring a [`Prober`].
#[derive(Debug)]
pub struct ProberBuilder {
    agent_id: String,
    target: String,
    config: ProbeConfig,
    transport: TransportKind,
    outputs: Vec<Output>,
}

impl ProberBuilder {
    /// Set the timing parameters.
    pub fn config(mut self, config: ProbeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the transport (UDP by default).
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Add an output destination.
    ///
    /// Multiple outputs can be added; records will be emitted to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Validate the configuration and build the prober.
    pub fn build(self) -> Result<Prober, ConfigError> {
        self.config.validate()?;
        Ok(Prober {
            agent_id: self.agent_id,
            target: self.target,
            config: self.config,
            transport: self.transport,
            outputs: self.outputs,
        })
    }
}

/// Handle for a running prober.
#[derive(Debug)]
pub struct ProberHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<ProberStats>>,
}

impl ProberHandle {
    /// Counters so far.
    pub fn stats(&self) -> ProberStats {
        *self.stats.lock()
    }

    /// Stop probing and wait for the background tasks to wind down.
    ///
    /// Windows that have not reached their finalize deadline are dropped;
    /// records already finalized are delivered unless an output holds up
    /// shutdown, in which case the remaining records are abandoned.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        for mut task in self.tasks {
            match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "prober task failed"),
                Err(_) => {
                    warn!(timeout = ?STOP_TIMEOUT, "prober task did not stop in time, aborting");
                    task.abort();
                }
            }
        }
        info!("prober stopped");
    }
}

/// Whether a stop signal (or the loss of the handle) was observed.
fn stop_requested(changed: Result<(), watch::error::RecvError>, stop: &watch::Receiver<bool>) -> bool {
    changed.is_err() || *stop.borrow()
}

async fn run_engine(
    mut engine: Engine,
    mut commands: mpsc::Receiver<Command>,
    records: mpsc::UnboundedSender<AggregateRecord>,
    clock: MonoClock,
    sweep_interval: Duration,
    stats: Arc<Mutex<ProberStats>>,
) {
    let mut sweep = tokio::time::interval(sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Sent { seq, sent_ns, wall } => {
                        // Duplicates are logged by the engine; the probe stays charged
                        let _ = engine.on_send(seq, sent_ns, wall);
                    }
                    Command::SendFailed { seq, sent_ns } => engine.on_send_failed(seq, sent_ns),
                    Command::Echo { payload, recv_ns } => {
                        if let EchoOutcome::Matched { window, rtt_ms } = engine.on_echo(&payload, recv_ns) {
                            trace!(window = %window.start_time(), rtt_ms, "echo matched");
                        }
                    }
                    Command::Tick { wall } => {
                        for record in engine.on_tick(wall) {
                            if records.send(record).is_err() {
                                warn!("record emitter gone, dropping record");
                            }
                        }
                    }
                }
            }
            _ = sweep.tick() => {
                let expired = engine.sweep(clock.now_ns());
                if expired > 0 {
                    trace!(expired, in_flight = engine.tracker().len(), "swept in-flight table");
                }
            }
        }
        stats.lock().engine = engine.stats();
    }
    debug!(in_flight = engine.tracker().len(), "engine actor finished");
}

async fn send_loop(
    agent_id: String,
    period: Duration,
    clock: MonoClock,
    transmit: mpsc::Sender<Transmit>,
    commands: mpsc::Sender<Command>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq = SeqNo::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if stop_requested(changed, &stop) {
                    break;
                }
                continue;
            }
        }

        let sent_ns = clock.now_ns();
        let frame = ProbeFrame::new(agent_id.as_str(), seq, sent_ns);
        let payload = match codec::encode(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%seq, error = %err, "failed to encode probe");
                continue;
            }
        };

        // Register before transmitting so a fast echo cannot overtake it
        let sent = Command::Sent {
            seq,
            sent_ns,
            wall: Utc::now(),
        };
        if commands.send(sent).await.is_err() {
            break;
        }
        if transmit.try_send(Transmit { seq, sent_ns, payload }).is_err() {
            debug!(%seq, "transmit queue full, probe abandoned");
            if commands.send(Command::SendFailed { seq, sent_ns }).await.is_err() {
                break;
            }
        }
        seq = seq.next();
    }
    debug!("send loop finished");
}

async fn transmit_loop(
    mut sender: ProbeSender,
    mut queue: mpsc::Receiver<Transmit>,
    commands: mpsc::Sender<Command>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let probe = tokio::select! {
            probe = queue.recv() => match probe {
                Some(probe) => probe,
                None => break,
            },
            changed = stop.changed() => {
                if stop_requested(changed, &stop) {
                    break;
                }
                continue;
            }
        };

        let Transmit { seq, sent_ns, payload } = probe;
        if let Err(err) = sender.send(&payload).await {
            match err {
                TransportError::NotConnected => debug!(%seq, "probe dropped while reconnecting"),
                err => warn!(%seq, error = %err, "probe send failed"),
            }
            if commands.send(Command::SendFailed { seq, sent_ns }).await.is_err() {
                break;
            }
        }
    }
    debug!("transmit loop finished");
}

async fn receive_loop(
    mut receiver: ProbeReceiver,
    clock: MonoClock,
    commands: mpsc::Sender<Command>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let received = tokio::select! {
            received = receiver.recv() => received,
            changed = stop.changed() => {
                if stop_requested(changed, &stop) {
                    break;
                }
                continue;
            }
        };
        let recv_ns = clock.now_ns();

        match received {
            Ok(payload) => {
                if commands.send(Command::Echo { payload, recv_ns }).await.is_err() {
                    break;
                }
            }
            Err(TransportError::Shutdown) => break,
            Err(err) => {
                warn!(error = %err, "echo receive failed");
                tokio::time::sleep(RECV_BACKOFF).await;
            }
        }
    }
    debug!("receive loop finished");
}

async fn finalize_timer(
    window_ms: i64,
    grace_ms: i64,
    commands: mpsc::Sender<Command>,
    mut stop: watch::Receiver<bool>,
) {
    let mut deadline = next_finalize_deadline(Utc::now().timestamp_millis(), window_ms, grace_ms);

    loop {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        if now_ms >= deadline {
            if commands.send(Command::Tick { wall: now }).await.is_err() {
                break;
            }
            deadline = next_finalize_deadline(now_ms, window_ms, grace_ms);
            continue;
        }

        let wait = Duration::from_millis((deadline - now_ms) as u64).min(MAX_TIMER_SLEEP);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = stop.changed() => {
                if stop_requested(changed, &stop) {
                    break;
                }
            }
        }
    }
    debug!("finalize timer finished");
}

async fn emit_records(
    mut records: mpsc::UnboundedReceiver<AggregateRecord>,
    outputs: Vec<Output>,
    stats: Arc<Mutex<ProberStats>>,
) {
    while let Some(record) = records.recv().await {
        info!(
            window = %record.time_label(),
            sent = record.sent,
            received = record.received,
            lost = record.lost,
            latency_avg_ms = record.latency_avg_ms,
            jitter_avg_ms = record.jitter_avg_ms,
            "window finalized"
        );
        for output in &outputs {
            let emitted = tokio::time::timeout(EMIT_TIMEOUT, output.emit(&record))
                .await
                .unwrap_or(Err(SinkError::Timeout(EMIT_TIMEOUT)));
            if let Err(err) = emitted {
                stats.lock().sink_failures += 1;
                warn!(output = output.name(), error = %err, "failed to emit record");
            }
        }
        stats.lock().records_emitted += 1;
    }
}
