//! Error Types for the Sampling Core
//!
//! ## Error Categories
//!
//! Errors fall into three groups, each with a different propagation rule:
//!
//! ### Configuration Errors
//! - `UnknownMetric`: no Metric Source is registered under the requested name
//! - `InvalidInterval`: the sampling interval cannot drive a loop (zero)
//! - `DuplicateHandle`: the same (device, source) pair was registered twice
//!
//! These are fatal and surface at setup, before the loop starts.
//!
//! ### Caller Errors
//! - `NotRegistered`: `read` was asked for a handle the store does not know
//! - `AlreadyRunning`: `register`, `run` or `poll_once` while the loop is active
//!
//! Reported synchronously to whoever made the call. The store is never
//! modified as a side effect of one of these.
//!
//! ### Clock Errors
//! - `ClockNotSynchronized`: no anchor has been captured yet
//! - `AnchorsOutOfOrder`: a new anchor would make the tick mapping run backwards
//!
//! ## In-Loop Failures
//!
//! Metric Source failures are *not* `SamplerError`s. Sources return a
//! [`SourceError`], the loop logs it and moves on to the next handle:
//!
//! ```rust
//! use hwsampler_core::{SamplerError, SourceError};
//!
//! fn describe(err: &SamplerError) -> &'static str {
//!     match err {
//!         SamplerError::UnknownMetric { .. } | SamplerError::InvalidInterval { .. } => "fix the configuration",
//!         SamplerError::NotRegistered { .. } => "register the handle first",
//!         _ => "see the message",
//!     }
//! }
//!
//! let err = SourceError::new("device lost");
//! assert_eq!(err.to_string(), "metric source failed: device lost");
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::handle::HandleKey;
use crate::time::WallTime;

/// Result type for sampling operations
pub type SamplerResult<T> = Result<T, SamplerError>;

/// Errors reported to callers of the sampling core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    /// No Metric Source matches the requested metric name
    #[error("unknown metric '{name}'")]
    UnknownMetric {
        /// Name that failed to resolve
        name: String,
    },

    /// A Metric Source is already registered under this name
    #[error("metric '{name}' is already defined")]
    DuplicateMetric {
        /// Name registered twice
        name: String,
    },

    /// Sampling interval cannot be used to drive the loop
    #[error("invalid sampling interval {interval:?}: {reason}")]
    InvalidInterval {
        /// Rejected interval
        interval: Duration,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The same handle was registered twice
    #[error("handle {key} is already registered")]
    DuplicateHandle {
        /// Offending handle
        key: HandleKey,
    },

    /// Read on a handle that was never registered
    #[error("handle {key} is not registered")]
    NotRegistered {
        /// Unknown handle
        key: HandleKey,
    },

    /// Operation requires the sampling loop to be stopped
    #[error("sampling engine is already running")]
    AlreadyRunning,

    /// No clock anchor has been captured yet
    #[error("clock domains are not synchronized")]
    ClockNotSynchronized,

    /// Anchor would map a later wall-clock instant to an earlier tick
    #[error("clock anchor out of order: ({wall}, {ticks}) precedes ({prev_wall}, {prev_ticks})")]
    AnchorsOutOfOrder {
        /// Wall-clock instant of the rejected anchor
        wall: WallTime,
        /// Tick value of the rejected anchor
        ticks: u64,
        /// Wall-clock instant of the latest accepted anchor
        prev_wall: WallTime,
        /// Tick value of the latest accepted anchor
        prev_ticks: u64,
    },

    /// The background thread could not be spawned
    #[error("failed to spawn sampling thread: {0}")]
    Spawn(String),
}

/// Failure reported by a Metric Source for one query
///
/// Contained to the handle and cycle that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("metric source failed: {reason}")]
pub struct SourceError {
    reason: String,
}

impl SourceError {
    /// Create a source error with a human-readable reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Reason given by the source
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
