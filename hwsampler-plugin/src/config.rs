//! Plugin configuration
//!
//! Read once at startup, either deserialized or from environment variables:
//!
//! | Variable              | Meaning                          | Default     |
//! |-----------------------|----------------------------------|-------------|
//! | `<PREFIX>_INTERVAL`   | sampling interval, milliseconds  | `5`         |
//! | `<PREFIX>_SHUTDOWN`   | `interrupt` or `finish-interval` | `interrupt` |
//! | `<PREFIX>_DEVICE_LABEL` | word used in handle names      | `device`    |
//!
//! The interval is converted to a `Duration` here and never reinterpreted.

use std::time::Duration;

use hwsampler_core::clock::DEFAULT_TICKS_PER_SECOND;
use hwsampler_core::registry::DEFAULT_DEVICE_LABEL;
use hwsampler_core::{EngineConfig, ShutdownMode};
use serde::{Deserialize, Serialize};

use crate::{PluginError, PluginResult};

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "HWSAMPLER";

const DEFAULT_INTERVAL_MS: &str = "5";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Sampling interval in milliseconds
    pub interval_ms: u64,
    pub shutdown: ShutdownMode,
    pub device_label: String,
    /// Nominal rate of the consumer's tick clock, used until two anchors exist
    pub ticks_per_second: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5,
            shutdown: ShutdownMode::default(),
            device_label: DEFAULT_DEVICE_LABEL.to_string(),
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
        }
    }
}

impl PluginConfig {
    /// Load from the process environment
    pub fn from_env(prefix: &str) -> PluginResult<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names
    pub fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> PluginResult<Self> {
        let mut config = Self::default();

        let key = format!("{prefix}_INTERVAL");
        let raw = lookup(&key).unwrap_or_else(|| DEFAULT_INTERVAL_MS.to_string());
        config.interval_ms = raw.trim().parse().map_err(|_| PluginError::Config {
            key: key.clone(),
            value: raw.clone(),
            reason: "expected a whole number of milliseconds".into(),
        })?;
        if config.interval_ms == 0 {
            return Err(PluginError::Config {
                key,
                value: raw,
                reason: "interval must be greater than zero".into(),
            });
        }

        let key = format!("{prefix}_SHUTDOWN");
        if let Some(raw) = lookup(&key) {
            config.shutdown = match raw.trim() {
                "interrupt" => ShutdownMode::Interrupt,
                "finish-interval" => ShutdownMode::FinishInterval,
                _ => {
                    return Err(PluginError::Config {
                        key,
                        value: raw,
                        reason: "expected 'interrupt' or 'finish-interval'".into(),
                    })
                }
            };
        }

        if let Some(label) = lookup(&format!("{prefix}_DEVICE_LABEL")) {
            config.device_label = label;
        }

        Ok(config)
    }

    /// Sampling interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Engine configuration derived from this one
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.interval()).shutdown_mode(self.shutdown)
    }
}
