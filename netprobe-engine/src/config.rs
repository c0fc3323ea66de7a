//! Probe configuration.

use std::time::Duration;

use netprobe_types::SEQ_SPACE;

use crate::error::ConfigError;

/// Timing parameters of the measurement engine.
///
/// # Example
///
/// ```rust
/// use netprobe_engine::ProbeConfig;
/// use std::time::Duration;
///
/// let config = ProbeConfig::builder()
///     .rate_hz(10.0)
///     .window(Duration::from_secs(60))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.period(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Probes sent per second.
    pub rate_hz: f64,
    /// Tumbling window length.
    pub window: Duration,
    /// Extra wait after a window ends before it is finalized.
    pub grace: Duration,
    /// Maximum round-trip time for an echo to still count.
    pub timeout: Duration,
    /// How often expired in-flight entries are evicted.
    pub sweep_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            rate_hz: 2.0,
            window: Duration::from_secs(60),
            grace: Duration::from_secs(2),
            timeout: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(250),
        }
    }
}

impl ProbeConfig {
    /// Create a builder starting from the defaults.
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::default()
    }

    /// Check the configuration can run without colliding sequence numbers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 {
            return Err(ConfigError::InvalidRate(self.rate_hz));
        }
        if self.window < Duration::from_secs(1) {
            return Err(ConfigError::EmptyWindow);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.grace >= self.window {
            return Err(ConfigError::GraceTooLong {
                grace_ms: self.grace.as_millis(),
                window_ms: self.window.as_millis(),
            });
        }
        let outstanding = self.max_outstanding();
        if outstanding >= u64::from(SEQ_SPACE) {
            return Err(ConfigError::SequenceSpaceExhausted { outstanding });
        }
        Ok(())
    }

    /// Interval between two probes.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }

    /// Upper bound on probes outstanding at once: `ceil(rate x timeout)`.
    pub fn max_outstanding(&self) -> u64 {
        (self.rate_hz * self.timeout.as_secs_f64()).ceil() as u64
    }

    pub(crate) fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }

    pub(crate) fn grace_ms(&self) -> i64 {
        self.grace.as_millis() as i64
    }

    pub(crate) fn timeout_ns(&self) -> u64 {
        self.timeout.as_nanos() as u64
    }
}

/// Builder for [`ProbeConfig`].
#[derive(Debug, Default)]
pub struct ProbeConfigBuilder {
    config: ProbeConfig,
}

impl ProbeConfigBuilder {
    /// Probes per second (default 2).
    pub fn rate_hz(mut self, rate_hz: f64) -> Self {
        self.config.rate_hz = rate_hz;
        self
    }

    /// Window length (default 60s).
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Grace period (default 2s).
    pub fn grace(mut self, grace: Duration) -> Self {
        self.config.grace = grace;
        self
    }

    /// Echo timeout (default 2s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// In-flight sweep interval (default 250ms).
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ProbeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProbeConfig::default();
        assert_eq!(config.rate_hz, 2.0);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.grace, Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn period_is_inverse_of_rate() {
        let config = ProbeConfig::default();
        assert_eq!(config.period(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_non_positive_rate() {
        let err = ProbeConfig::builder().rate_hz(0.0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidRate(0.0));
        assert!(ProbeConfig::builder().rate_hz(f64::NAN).build().is_err());
    }

    #[test]
    fn rejects_sub_second_window() {
        let err = ProbeConfig::builder()
            .window(Duration::from_millis(500))
            .grace(Duration::from_millis(100))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyWindow);
    }

    #[test]
    fn rejects_grace_as_long_as_window() {
        let err = ProbeConfig::builder()
            .window(Duration::from_secs(10))
            .grace(Duration::from_secs(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::GraceTooLong { .. }));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = ProbeConfig::builder()
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidTimeout);
    }

    #[test]
    fn rejects_rate_times_timeout_beyond_sequence_space() {
        // 40 kHz for 2 seconds is 80000 outstanding probes
        let err = ProbeConfig::builder().rate_hz(40_000.0).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::SequenceSpaceExhausted { outstanding: 80_000 }
        );
    }

    #[test]
    fn accepts_rate_just_under_sequence_space() {
        let config = ProbeConfig::builder()
            .rate_hz(32_767.0)
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        assert_eq!(config.max_outstanding(), 65_534);
    }
}
