//! Measurement-Environment Integration for hwsampler
//!
//! ## Overview
//!
//! `hwsampler-core` knows nothing about vendor libraries or about the
//! measurement environment that asks for samples. This crate is the glue:
//!
//! ```text
//! ┌──────────────────┐   devices   ┌───────────────┐  handles  ┌─────────────────┐
//! │ VendorLibrary    │────────────▶│ MetricCatalog │──────────▶│ SamplingEngine  │
//! │ (init/shutdown)  │             │ + properties  │           │ (hwsampler-core)│
//! └──────────────────┘             └───────────────┘           └────────┬────────┘
//!                                                                       │ series
//!                         start/stop anchors ┌─────────────┐            ▼
//!               measurement environment ────▶│ ClockBridge │──▶ Cursor::write(ticks, value)
//!                                            └─────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. [`SamplingPlugin::new`] opens the vendor session and enumerates devices
//! 2. [`SamplingPlugin::metric_properties`] expands a metric name into one
//!    handle per device and declares each to the environment
//! 3. [`SamplingPlugin::start`] anchors the clocks and starts the loop
//! 4. [`SamplingPlugin::stop`] stops the loop and anchors again
//! 5. [`SamplingPlugin::all_values`] replays each handle's series through a
//!    [`Cursor`], post-mortem
//!
//! Dropping the plugin stops the engine before shutting the vendor library down.
//!
//! ## Configuration
//!
//! ```rust
//! use hwsampler_plugin::PluginConfig;
//!
//! let env = [("HWSAMPLER_INTERVAL", "20")];
//! let config = PluginConfig::from_lookup("HWSAMPLER", |key| {
//!     env.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
//! })?;
//! assert_eq!(config.interval_ms, 20);
//! # Ok::<(), hwsampler_plugin::PluginError>(())
//! ```

pub mod config;
pub mod cursor;
pub mod plugin;
pub mod properties;
pub mod vendor;

// Re-export common types
pub use config::PluginConfig;
pub use cursor::{Cursor, VecCursor};
pub use plugin::SamplingPlugin;
pub use properties::{MeasureKind, MetricCatalog, MetricDescriptor, MetricProperty, ValueType};
pub use vendor::{DeviceStatus, VendorError, VendorLibrary, VendorSession};

use hwsampler_core::SamplerError;
use thiserror::Error;

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Plugin errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PluginError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error("vendor library error: {0}")]
    Vendor(#[from] VendorError),

    #[error("invalid configuration {key}='{value}': {reason}")]
    Config {
        key: String,
        value: String,
        reason: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}
