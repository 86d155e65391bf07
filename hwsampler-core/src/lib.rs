//! Periodic sampling engine for hardware metric sources
//!
//! Collects time-stamped numeric readings from a set of (device, metric)
//! sources on a background thread, keeps them per handle, and hands copies to
//! a measurement environment that asks for them, usually after measurement has
//! ended. Sample timestamps are host wall-clock instants; the
//! [`clock::ClockBridge`] maps them into the consumer's tick domain.
//!
//! Key properties:
//! - One writer (the loop), any number of readers, one mutex per cycle
//! - Failures inside a cycle never stop the loop
//! - Unknown handles are reported, never silently created
//!
//! ```no_run
//! use std::sync::Arc;
//! use hwsampler_core::{EngineConfig, SamplingEngine, HandleRegistry, DeviceId, SourceError};
//! use hwsampler_core::clock::{ClockBridge, InstantTicks};
//! use hwsampler_core::source::RawReading;
//!
//! let power = Arc::new(|_: DeviceId, _: u64| -> Result<Vec<RawReading>, SourceError> { Ok(vec![]) });
//! let registry = HandleRegistry::new(vec![DeviceId(0)]).with_source("power", power)?;
//! let handles = registry.expand("power")?;
//!
//! let engine = SamplingEngine::with_system_clock(EngineConfig::default())?;
//! engine.register(handles.clone())?;
//!
//! let ticks = InstantTicks::new();
//! let mut bridge = ClockBridge::default();
//! bridge.synchronize_point(&ticks)?;
//! engine.start()?;
//! // ... measurement runs ...
//! engine.stop();
//! engine.join();
//! bridge.synchronize_point(&ticks)?;
//!
//! for (tick, value) in engine.readings(handles[0].key(), bridge.mapping()?)? {
//!     println!("{tick}: {value}");
//! }
//! # Ok::<(), hwsampler_core::SamplerError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handle;
pub mod registry;
pub mod source;
pub mod store;
pub mod time;

// Public API
pub use clock::{ClockAnchor, ClockBridge, TickMapping, TickSource, Ticks};
pub use config::{EngineConfig, ShutdownMode};
pub use engine::{CycleReport, EngineStats, SamplingEngine, TickReadings};
pub use errors::{SamplerError, SamplerResult, SourceError};
pub use handle::{DeviceId, HandleKey, MetricHandle, SourceId};
pub use registry::HandleRegistry;
pub use source::{MetricSource, RawReading};
pub use store::{Sample, SampleStore, Series};
pub use time::{ClockReading, TimeManager, TimeSource, WallTime};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
