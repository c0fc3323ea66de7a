//! Layered configuration.
//!
//! Built-in defaults, then an optional TOML file, then `NETPROBE_*`
//! environment variables (`__` separates nesting levels, for example
//! `NETPROBE_PROBE__RATE_HZ=5`). Command-line flags are applied on top by
//! [`crate::cli`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, Map};
use netprobe_engine::{ProbeConfig, TransportKind};
use serde::{Deserialize, Serialize};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "NETPROBE";

/// Default responder port.
pub const DEFAULT_PORT: u16 = 4401;

/// Complete runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub probe: ProbeSettings,
    pub agent: AgentSettings,
    pub output: OutputSettings,
    pub echo: EchoSettings,
}

/// Probe timing and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Echo responder address (`host:port`).
    pub target: String,
    pub transport: TransportKind,
    pub rate_hz: f64,
    pub window_secs: u64,
    pub grace_secs: f64,
    pub timeout_secs: f64,
    pub sweep_interval_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        let defaults = ProbeConfig::default();
        Self {
            target: format!("127.0.0.1:{DEFAULT_PORT}"),
            transport: TransportKind::Udp,
            rate_hz: defaults.rate_hz,
            window_secs: defaults.window.as_secs(),
            grace_secs: defaults.grace.as_secs_f64(),
            timeout_secs: defaults.timeout.as_secs_f64(),
            sweep_interval_ms: defaults.sweep_interval.as_millis() as u64,
        }
    }
}

/// Agent identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Fixed agent id. When unset a UUID is generated once and persisted.
    pub id: Option<String>,
    /// Where the generated id is kept (default `$HOME/.netprobe`).
    pub state_dir: Option<PathBuf>,
}

impl AgentSettings {
    /// The state directory, falling back to `$HOME/.netprobe`.
    pub fn state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => dir.clone(),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".netprobe"),
        }
    }
}

/// Where finalized records go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Print each record to stdout as one JSON line.
    pub stdout: bool,
    /// Append records to this JSON-lines file.
    pub file: Option<PathBuf>,
    /// Send records to this TCP collector.
    pub tcp: Option<String>,
    /// Publish records to this NATS server.
    pub nats_url: Option<String>,
    pub nats_credentials: Option<String>,
    pub subject_prefix: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            stdout: true,
            file: None,
            tcp: None,
            nats_url: None,
            nats_credentials: None,
            subject_prefix: "netstats".to_string(),
        }
    }
}

/// The echo responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoSettings {
    pub bind: String,
    pub transport: TransportKind,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{DEFAULT_PORT}"),
            transport: TransportKind::Udp,
        }
    }
}

impl Settings {
    /// Load settings from the optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, None)
    }

    /// Load settings with an explicit environment instead of the process one.
    fn load_from(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| match path {
                Some(path) => format!("failed to load configuration from {}", path.display()),
                None => "failed to load configuration".to_string(),
            })?;

        config
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Convert the probe section into a validated engine configuration.
    pub fn probe_config(&self) -> Result<ProbeConfig> {
        let probe = &self.probe;
        let config = ProbeConfig::builder()
            .rate_hz(probe.rate_hz)
            .window(Duration::from_secs(probe.window_secs))
            .grace(seconds("probe.grace_secs", probe.grace_secs)?)
            .timeout(seconds("probe.timeout_secs", probe.timeout_secs)?)
            .sweep_interval(Duration::from_millis(probe.sweep_interval_ms.max(1)))
            .build()?;
        Ok(config)
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow!("{key} must be a non-negative number of seconds, got {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netprobe_engine::ConfigError;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_without_sources() {
        let settings = Settings::load_from(None, env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.probe.target, "127.0.0.1:4401");
        assert!(settings.output.stdout);
        assert_eq!(settings.output.subject_prefix, "netstats");

        let config = settings.probe_config().unwrap();
        assert_eq!(config, ProbeConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[probe]
target = "10.0.0.5:7"
transport = "tcp"
rate_hz = 5.0

[output]
stdout = false
file = "/var/lib/netprobe/records.jsonl"
"#
        )
        .unwrap();

        let settings = Settings::load_from(Some(file.path()), env(&[])).unwrap();
        assert_eq!(settings.probe.target, "10.0.0.5:7");
        assert_eq!(settings.probe.transport, TransportKind::Tcp);
        assert_eq!(settings.probe.rate_hz, 5.0);
        assert_eq!(settings.probe.window_secs, 60);
        assert!(!settings.output.stdout);
        assert_eq!(
            settings.output.file,
            Some(PathBuf::from("/var/lib/netprobe/records.jsonl"))
        );
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[probe]\nrate_hz = 5.0\n").unwrap();

        let settings = Settings::load_from(
            Some(file.path()),
            env(&[
                ("NETPROBE_PROBE__RATE_HZ", "10"),
                ("NETPROBE_OUTPUT__NATS_URL", "nats://bus:4222"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.probe.rate_hz, 10.0);
        assert_eq!(settings.output.nats_url.as_deref(), Some("nats://bus:4222"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Settings::load_from(Some(Path::new("/nonexistent/netprobe.toml")), env(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn probe_config_is_validated() {
        let mut settings = Settings::default();
        settings.probe.grace_secs = 60.0;
        let err = settings.probe_config().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::GraceTooLong { .. })
        ));
    }

    #[test]
    fn negative_durations_are_rejected() {
        let mut settings = Settings::default();
        settings.probe.timeout_secs = -1.0;
        let err = settings.probe_config().unwrap_err();
        assert!(err.to_string().contains("probe.timeout_secs"));
    }

    #[test]
    fn explicit_state_dir_is_used() {
        let agent = AgentSettings {
            id: None,
            state_dir: Some(PathBuf::from("/tmp/np")),
        };
        assert_eq!(agent.state_dir(), PathBuf::from("/tmp/np"));
    }
}
