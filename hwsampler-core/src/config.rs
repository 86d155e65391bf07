//! Sampling engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{SamplerError, SamplerResult};

/// Sampling interval used when none is configured
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5);

/// Name given to the background sampling thread
pub const DEFAULT_THREAD_NAME: &str = "hwsampler";

/// How `stop()` interacts with a loop that is sleeping between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownMode {
    /// Wake the loop immediately; shutdown latency is one poll at most
    #[default]
    Interrupt,
    /// Let the current sleep run out; latency is up to one interval plus one poll
    FinishInterval,
}

/// Engine configuration
///
/// ```rust
/// use std::time::Duration;
/// use hwsampler_core::config::{EngineConfig, ShutdownMode};
///
/// let config = EngineConfig::new(Duration::from_millis(10))
///     .shutdown_mode(ShutdownMode::FinishInterval)
///     .thread_name("gpu-sampler");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period between poll cycles
    pub interval: Duration,
    /// Stop behaviour while sleeping
    pub shutdown_mode: ShutdownMode,
    /// Name of the background thread
    pub thread_name: String,
}

impl EngineConfig {
    /// Configuration with the given interval and default settings
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            shutdown_mode: ShutdownMode::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Set the shutdown mode
    pub fn shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }

    /// Set the background thread name
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Reject settings that cannot drive a loop
    pub fn validate(&self) -> SamplerResult<()> {
        if self.interval.is_zero() {
            return Err(SamplerError::InvalidInterval {
                interval: self.interval,
                reason: "interval must be greater than zero",
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        let err = EngineConfig::new(Duration::ZERO).validate().unwrap_err();
        assert!(matches!(err, SamplerError::InvalidInterval { .. }));
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.interval, Duration::from_millis(5));
        assert_eq!(config.shutdown_mode, ShutdownMode::Interrupt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shutdown_mode_names() {
        let mode: ShutdownMode = serde_json::from_str("\"finish-interval\"").unwrap();
        assert_eq!(mode, ShutdownMode::FinishInterval);
    }
}
