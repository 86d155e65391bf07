//! Metric Source capability
//!
//! A Metric Source wraps one vendor query (power draw, clock, utilization, ...)
//! and answers "which readings does device `d` have newer than `t`?". The
//! sampling core calls it once per handle per poll cycle and stores whatever
//! comes back without interpreting it.
//!
//! ## Implementation Requirements
//!
//! - Return only readings with `timestamp_micros > since_micros`; an empty
//!   vector is a normal answer
//! - Return quickly: the loop cadence depends on it and the store is locked
//!   for the duration of the cycle
//! - Report failures as [`SourceError`], never panic
//!
//! ```rust
//! use hwsampler_core::source::{MetricSource, RawReading};
//! use hwsampler_core::{DeviceId, SourceError};
//!
//! struct ConstantPower;
//!
//! impl MetricSource for ConstantPower {
//!     fn query(&self, _device: DeviceId, since_micros: u64) -> Result<Vec<RawReading>, SourceError> {
//!         Ok(vec![RawReading { timestamp_micros: since_micros + 1, value: 250_000 }])
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::SourceError;
use crate::handle::DeviceId;

/// One reading as reported by a Metric Source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReading {
    /// Microseconds since the Unix epoch
    pub timestamp_micros: u64,
    /// Opaque value
    pub value: u64,
}

impl RawReading {
    /// Create a reading
    pub const fn new(timestamp_micros: u64, value: u64) -> Self {
        Self {
            timestamp_micros,
            value,
        }
    }
}

/// Hardware metric query for one kind of metric across devices
pub trait MetricSource: Send + Sync {
    /// Readings for `device` newer than `since_micros`
    fn query(&self, device: DeviceId, since_micros: u64) -> Result<Vec<RawReading>, SourceError>;
}

impl<F> MetricSource for F
where
    F: Fn(DeviceId, u64) -> Result<Vec<RawReading>, SourceError> + Send + Sync,
{
    fn query(&self, device: DeviceId, since_micros: u64) -> Result<Vec<RawReading>, SourceError> {
        self(device, since_micros)
    }
}
