//! Wall-clock handling for the sampling loop
//!
//! Provides clock abstraction over the sources the engine can stamp polls with:
//! - System clock (always available)
//! - A clock synchronized with the consuming measurement environment, which
//!   may not be set yet when the loop starts
//! - A manually driven clock for tests
//!
//! "Not synchronized yet" is the expected state before the first anchor, so it
//! is a [`ClockReading`] value, not an error. [`TimeManager`] resolves it by
//! falling back to a secondary source.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall-clock instant attached to every sample
pub type WallTime = DateTime<Utc>;

/// Convert microseconds since the Unix epoch to a wall-clock instant
///
/// Values beyond the representable range saturate to the latest instant.
pub fn from_unix_micros(micros: u64) -> WallTime {
    i64::try_from(micros)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Convert a wall-clock instant to microseconds since the Unix epoch
///
/// Instants before the epoch map to 0.
pub fn to_unix_micros(time: WallTime) -> u64 {
    u64::try_from(time.timestamp_micros()).unwrap_or(0)
}

/// Result of reading a time source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockReading {
    /// The source has a valid time
    Synchronized(WallTime),
    /// The source has not been set yet
    Unsynchronized,
}

/// Source of wall-clock time for the sampling loop
///
/// Implementations are shared between the caller's thread and the
/// background loop, so they must be `Send + Sync`.
pub trait TimeSource: Send + Sync {
    /// Read the current time
    fn now(&self) -> ClockReading;
}

/// Host wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> ClockReading {
        ClockReading::Synchronized(Utc::now())
    }
}

/// Manually driven clock for tests and replay
///
/// Starts unsynchronized unless created with [`ManualClock::at`].
#[derive(Debug, Default)]
pub struct ManualClock {
    current: Mutex<Option<WallTime>>,
}

impl ManualClock {
    /// Clock with no time set
    pub fn unsynchronized() -> Self {
        Self::default()
    }

    /// Clock set to `time`
    pub fn at(time: WallTime) -> Self {
        Self {
            current: Mutex::new(Some(time)),
        }
    }

    /// Set the current time
    pub fn set(&self, time: WallTime) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(time);
    }

    /// Move the clock forward; no effect while unsynchronized
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(time) = current.as_mut() {
            if let Some(next) = chrono::Duration::from_std(by)
                .ok()
                .and_then(|delta| time.checked_add_signed(delta))
            {
                *time = next;
            }
        }
    }

    /// Forget the current time
    pub fn clear(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> ClockReading {
        match *self.current.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(time) => ClockReading::Synchronized(time),
            None => ClockReading::Unsynchronized,
        }
    }
}

/// Time resolved by a [`TimeManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTime {
    /// The instant to use
    pub time: WallTime,
    /// Whether the primary source was unsynchronized and the fallback answered
    pub from_fallback: bool,
}

/// Manages time with a fallback source
///
/// The primary is normally the clock shared with the measurement environment.
/// When it reports [`ClockReading::Unsynchronized`] the fallback is used. If the
/// fallback is unsynchronized as well, the host clock answers.
#[derive(Clone)]
pub struct TimeManager {
    primary: Arc<dyn TimeSource>,
    fallback: Arc<dyn TimeSource>,
}

impl TimeManager {
    /// Manager falling back to the host clock
    pub fn new(primary: Arc<dyn TimeSource>) -> Self {
        Self {
            primary,
            fallback: Arc::new(SystemClock),
        }
    }

    /// Replace the fallback source
    pub fn with_fallback(mut self, fallback: Arc<dyn TimeSource>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Get current time, using the fallback if the primary is not set
    pub fn now(&self) -> ResolvedTime {
        if let ClockReading::Synchronized(time) = self.primary.now() {
            return ResolvedTime {
                time,
                from_fallback: false,
            };
        }

        let time = match self.fallback.now() {
            ClockReading::Synchronized(time) => time,
            ClockReading::Unsynchronized => Utc::now(),
        };
        ResolvedTime {
            time,
            from_fallback: true,
        }
    }
}

impl Default for TimeManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for TimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeManager").finish_non_exhaustive()
    }
}
