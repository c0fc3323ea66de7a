use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use netprobe::agent;
use netprobe::cli::{Cli, Command};
use netprobe::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command.unwrap_or_default() {
        Command::Probe(args) => {
            args.apply(&mut settings);
            agent::run(settings).await
        }
        Command::Echo(args) => {
            args.apply(&mut settings);
            agent::run_echo(&settings.echo).await
        }
    }
}

/// Logs go to stderr; stdout carries records.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
