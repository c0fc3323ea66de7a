//! Command-line interface.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use netprobe_engine::TransportKind;

use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "netprobe", version)]
#[command(about = "Measure latency, jitter and packet loss against an echo responder")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send probes and emit one record per window (default)
    Probe(ProbeArgs),
    /// Run the echo responder
    Echo(EchoArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Probe(ProbeArgs::default())
    }
}

#[derive(Args, Debug, Default)]
pub struct ProbeArgs {
    /// Echo responder address (host:port)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Transport: udp or tcp
    #[arg(long)]
    pub transport: Option<TransportKind>,

    /// Probes per second
    #[arg(short, long)]
    pub rate: Option<f64>,

    /// Window length in seconds
    #[arg(long)]
    pub window_secs: Option<u64>,

    /// Use this agent id instead of the persisted one
    #[arg(long)]
    pub agent_id: Option<String>,

    /// Directory holding the persisted agent id
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Append records to a JSON-lines file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Publish records to a NATS server (e.g. nats://localhost:4222)
    #[arg(long)]
    pub nats_url: Option<String>,

    /// Do not print records to stdout
    #[arg(short, long)]
    pub quiet: bool,
}

impl ProbeArgs {
    /// Apply flags on top of file and environment settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(target) = &self.target {
            settings.probe.target = target.clone();
        }
        if let Some(transport) = self.transport {
            settings.probe.transport = transport;
        }
        if let Some(rate) = self.rate {
            settings.probe.rate_hz = rate;
        }
        if let Some(window) = self.window_secs {
            settings.probe.window_secs = window;
        }
        if let Some(id) = &self.agent_id {
            settings.agent.id = Some(id.clone());
        }
        if let Some(dir) = &self.state_dir {
            settings.agent.state_dir = Some(dir.clone());
        }
        if let Some(path) = &self.output {
            settings.output.file = Some(path.clone());
        }
        if let Some(url) = &self.nats_url {
            settings.output.nats_url = Some(url.clone());
        }
        if self.quiet {
            settings.output.stdout = false;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct EchoArgs {
    /// Address to listen on
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Transport: udp or tcp
    #[arg(long)]
    pub transport: Option<TransportKind>,
}

impl EchoArgs {
    /// Apply flags on top of file and environment settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(bind) = &self.bind {
            settings.echo.bind = bind.clone();
        }
        if let Some(transport) = self.transport {
            settings.echo.transport = transport;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_probe() {
        let cli = Cli::try_parse_from(["netprobe"]).unwrap();
        assert!(cli.command.is_none());
        assert!(matches!(cli.command.unwrap_or_default(), Command::Probe(_)));
    }

    #[test]
    fn probe_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "netprobe",
            "-vv",
            "probe",
            "--target",
            "192.0.2.10:4401",
            "--transport",
            "tcp",
            "--rate",
            "10",
            "--quiet",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);

        let Some(Command::Probe(args)) = cli.command else {
            panic!("expected probe subcommand");
        };
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(settings.probe.target, "192.0.2.10:4401");
        assert_eq!(settings.probe.transport, TransportKind::Tcp);
        assert_eq!(settings.probe.rate_hz, 10.0);
        assert!(!settings.output.stdout);
        // Untouched values keep their defaults
        assert_eq!(settings.probe.window_secs, 60);
    }

    #[test]
    fn echo_flags_override_settings() {
        let cli = Cli::try_parse_from(["netprobe", "echo", "--bind", "127.0.0.1:9000"]).unwrap();
        let Some(Command::Echo(args)) = cli.command else {
            panic!("expected echo subcommand");
        };
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(settings.echo.bind, "127.0.0.1:9000");
        assert_eq!(settings.echo.transport, TransportKind::Udp);
    }

    #[test]
    fn unknown_transport_is_rejected() {
        assert!(Cli::try_parse_from(["netprobe", "probe", "--transport", "sctp"]).is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["netprobe", "echo", "--config", "/etc/netprobe.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/netprobe.toml")));
    }
}
