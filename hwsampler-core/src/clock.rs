//! Clock Domain Bridge
//!
//! ## Overview
//!
//! Samples carry wall-clock instants taken by the hardware query. The
//! measurement environment consuming them works in its own tick domain. The
//! bridge maps one onto the other from explicit synchronization points
//! ([`ClockAnchor`]s), captured when measurement starts and when it stops.
//!
//! ## Mapping
//!
//! ```text
//! ticks(t) = first.ticks + (t - first.wall) * rate
//!
//! rate = nominal                                          one anchor
//! rate = (latest.ticks - first.ticks) / (latest.wall - first.wall)   two or more
//! ```
//!
//! Instants outside the anchored span are extrapolated with the same rate;
//! results below zero clamp to zero. Using the first and latest anchors
//! compensates for drift between the host clock and the tick source over the
//! whole measurement.
//!
//! ## Monotonicity
//!
//! Anchors must be non-decreasing in both domains, so `rate >= 0`, and every
//! step of the computation is monotonic. An anchor that would break this is
//! rejected with [`SamplerError::AnchorsOutOfOrder`] instead of producing a
//! mapping that runs backwards.
//!
//! ```rust
//! use hwsampler_core::clock::ClockBridge;
//! use hwsampler_core::time::from_unix_micros;
//!
//! let mut bridge = ClockBridge::new(1_000_000); // one tick per microsecond
//! bridge.synchronize(from_unix_micros(1_000), 0)?;
//! bridge.synchronize(from_unix_micros(2_000), 2_000)?; // tick source runs 2x
//!
//! assert_eq!(bridge.to_ticks(from_unix_micros(1_500))?, 1_000);
//! # Ok::<(), hwsampler_core::SamplerError>(())
//! ```

use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{SamplerError, SamplerResult};
use crate::time::{ClockReading, TimeSource, WallTime};

/// Value in the consumer's tick domain
pub type Ticks = u64;

/// Tick rate assumed until a second anchor exists
pub const DEFAULT_TICKS_PER_SECOND: u64 = 1_000_000_000;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Wall-clock instant paired with the tick value read at the same moment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockAnchor {
    /// Host wall clock
    pub wall: WallTime,
    /// Consumer tick clock
    pub ticks: Ticks,
}

/// The consumer's tick clock
pub trait TickSource: Send + Sync {
    /// Current tick value
    fn ticks(&self) -> Ticks;
}

/// Tick source counting nanoseconds since its creation
#[derive(Debug, Clone, Copy)]
pub struct InstantTicks {
    origin: Instant,
}

impl InstantTicks {
    /// Start counting now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for InstantTicks {
    fn ticks(&self) -> Ticks {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Bridge shared between the plugin hooks and the read path
pub type SharedClockBridge = Arc<RwLock<ClockBridge>>;

/// Converts wall-clock instants into the consumer's tick domain
#[derive(Debug, Clone)]
pub struct ClockBridge {
    nominal_ticks_per_second: u64,
    first: Option<ClockAnchor>,
    latest: Option<ClockAnchor>,
}

impl ClockBridge {
    /// Bridge with no anchors and the given nominal tick rate
    pub fn new(nominal_ticks_per_second: u64) -> Self {
        Self {
            nominal_ticks_per_second,
            first: None,
            latest: None,
        }
    }

    /// Wrap in the shared form used by [`AnchoredClock`]
    pub fn shared(self) -> SharedClockBridge {
        Arc::new(RwLock::new(self))
    }

    /// Record an anchor
    pub fn synchronize(&mut self, wall: WallTime, ticks: Ticks) -> SamplerResult<ClockAnchor> {
        let anchor = ClockAnchor { wall, ticks };
        if let Some(prev) = self.latest {
            if wall < prev.wall || ticks < prev.ticks {
                return Err(SamplerError::AnchorsOutOfOrder {
                    wall,
                    ticks,
                    prev_wall: prev.wall,
                    prev_ticks: prev.ticks,
                });
            }
        }
        if self.first.is_none() {
            self.first = Some(anchor);
        }
        self.latest = Some(anchor);
        Ok(anchor)
    }

    /// Record an anchor from the host clock and `ticks` read back to back
    pub fn synchronize_point(&mut self, ticks: &dyn TickSource) -> SamplerResult<ClockAnchor> {
        let wall = Utc::now();
        let ticks = ticks.ticks();
        self.synchronize(wall, ticks)
    }

    /// Whether at least one anchor exists
    pub fn is_synchronized(&self) -> bool {
        self.first.is_some()
    }

    /// First recorded anchor
    pub fn first_anchor(&self) -> Option<ClockAnchor> {
        self.first
    }

    /// Most recent anchor
    pub fn latest_anchor(&self) -> Option<ClockAnchor> {
        self.latest
    }

    /// Freeze the current anchors into a conversion
    pub fn mapping(&self) -> SamplerResult<TickMapping> {
        let (first, latest) = match (self.first, self.latest) {
            (Some(first), Some(latest)) => (first, latest),
            _ => return Err(SamplerError::ClockNotSynchronized),
        };

        let span_micros =
            i128::from(latest.wall.timestamp_micros()) - i128::from(first.wall.timestamp_micros());
        let ticks_per_micro = if span_micros > 0 {
            (latest.ticks - first.ticks) as f64 / span_micros as f64
        } else {
            self.nominal_ticks_per_second as f64 / MICROS_PER_SECOND
        };

        Ok(TickMapping {
            base_micros: first.wall.timestamp_micros(),
            base_ticks: first.ticks,
            ticks_per_micro,
        })
    }

    /// Convert one instant
    pub fn to_ticks(&self, instant: WallTime) -> SamplerResult<Ticks> {
        Ok(self.mapping()?.to_ticks(instant))
    }
}

impl Default for ClockBridge {
    fn default() -> Self {
        Self::new(DEFAULT_TICKS_PER_SECOND)
    }
}

/// Linear wall-clock to tick conversion captured from a [`ClockBridge`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickMapping {
    base_micros: i64,
    base_ticks: Ticks,
    ticks_per_micro: f64,
}

impl TickMapping {
    /// Ticks per microsecond of wall-clock time
    pub fn rate(&self) -> f64 {
        self.ticks_per_micro
    }

    /// Convert an instant, clamping at zero
    pub fn to_ticks(&self, instant: WallTime) -> Ticks {
        let delta = (i128::from(instant.timestamp_micros()) - i128::from(self.base_micros)) as f64;
        let offset = (delta * self.ticks_per_micro).round();
        if offset >= 0.0 {
            self.base_ticks.saturating_add(offset as u64)
        } else {
            self.base_ticks.saturating_sub((-offset) as u64)
        }
    }
}

/// Wall clock that reports unsynchronized until the bridge has an anchor
///
/// Used as the engine's primary time source so the loop notices when it runs
/// ahead of the measurement environment.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    bridge: SharedClockBridge,
}

impl AnchoredClock {
    /// Clock gated on `bridge`
    pub fn new(bridge: SharedClockBridge) -> Self {
        Self { bridge }
    }
}

impl TimeSource for AnchoredClock {
    fn now(&self) -> ClockReading {
        let synchronized = self
            .bridge
            .read()
            .map(|bridge| bridge.is_synchronized())
            .unwrap_or(false);
        if synchronized {
            ClockReading::Synchronized(Utc::now())
        } else {
            ClockReading::Unsynchronized
        }
    }
}
