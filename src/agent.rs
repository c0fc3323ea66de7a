//! Process wiring for the probing agent and the echo responder.

use anyhow::{Context, Result};
use netprobe_engine::{Output, Prober, ProberHandle};
use tracing::info;

use crate::echo::EchoServer;
use crate::identity;
use crate::settings::{EchoSettings, OutputSettings, Settings};

/// Start a prober from settings.
///
/// Returns once probing is running; the caller decides when to stop it.
pub async fn start(settings: &Settings) -> Result<ProberHandle> {
    let config = settings.probe_config()?;
    let agent_id = identity::resolve(&settings.agent)?;

    let mut builder = Prober::builder(agent_id, settings.probe.target.clone())
        .config(config)
        .transport(settings.probe.transport);
    for output in outputs(&settings.output).await? {
        builder = builder.output(output);
    }

    builder
        .build()?
        .start()
        .await
        .with_context(|| format!("failed to open transport to {}", settings.probe.target))
}

/// Run the agent until interrupted.
pub async fn run(settings: Settings) -> Result<()> {
    let handle = start(&settings).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    let stats = handle.stats();
    handle.stop().await;
    info!(
        records = stats.records_emitted,
        sent = stats.engine.sent,
        matched = stats.engine.matched,
        sink_failures = stats.sink_failures,
        "agent stopped"
    );
    Ok(())
}

/// Run the echo responder until interrupted.
pub async fn run_echo(settings: &EchoSettings) -> Result<()> {
    let server = EchoServer::bind(settings.transport, &settings.bind)
        .await
        .with_context(|| format!("failed to bind {} echo responder on {}", settings.transport, settings.bind))?;

    tokio::select! {
        result = server.run() => result.context("echo responder failed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("echo responder stopped");
            Ok(())
        }
    }
}

/// Build the configured outputs.
pub async fn outputs(settings: &OutputSettings) -> Result<Vec<Output>> {
    let mut outputs = Vec::new();
    if settings.stdout {
        outputs.push(Output::Stdout);
    }
    if let Some(path) = &settings.file {
        outputs.push(Output::file(path));
    }
    if let Some(addr) = &settings.tcp {
        outputs.push(Output::tcp(addr));
    }
    if let Some(url) = &settings.nats_url {
        outputs.push(nats_output(settings, url).await?);
    }
    Ok(outputs)
}

#[cfg(feature = "nats")]
async fn nats_output(settings: &OutputSettings, url: &str) -> Result<Output> {
    use netprobe_adapters::nats::NatsPublisher;

    let mut builder = NatsPublisher::builder()
        .url(url)
        .subject_prefix(settings.subject_prefix.clone());
    if let Some(creds) = &settings.nats_credentials {
        builder = builder.credentials_file(creds);
    }
    let publisher = builder
        .build()
        .await
        .with_context(|| format!("failed to connect to NATS at {url}"))?;
    info!(%url, prefix = %settings.subject_prefix, "publishing records to NATS");
    Ok(Output::sink(publisher))
}

#[cfg(not(feature = "nats"))]
async fn nats_output(_settings: &OutputSettings, url: &str) -> Result<Output> {
    anyhow::bail!("NATS output to {url} requested, but netprobe was built without the `nats` feature")
}
