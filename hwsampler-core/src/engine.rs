//! Periodic Sampling Engine
//!
//! ## Overview
//!
//! The engine owns the [`SampleStore`] and runs the collection loop on one
//! dedicated thread. Every `interval` it asks each registered handle's Metric
//! Source for readings newer than the previous poll and appends them to that
//! handle's series. Any other thread may read a copy of a series at any time,
//! during sampling or post-mortem.
//!
//! ## Poll Cycle
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────────────┐   ┌───────────┐
//! │ resolve time │──▶│ lock store    │──▶│ query every handle   │──▶│ re-stamp  │
//! │ (fallback?)  │   │               │   │ since last poll,     │   │ last poll │
//! └──────────────┘   └───────────────┘   │ append, unlock       │   └─────┬─────┘
//!        ▲                               └──────────────────────┘         │
//!        └──────────────────── sleep(interval), check stop ◀──────────────┘
//! ```
//!
//! ## Failure Containment
//!
//! Nothing that happens inside a cycle ends the loop:
//! - Measurement clock not synchronized: warn, use the fallback clock
//! - Metric Source error or panic: warn, that handle adds nothing this cycle
//!
//! ## Locking
//!
//! The store mutex is held for the whole append phase of a cycle, so readers
//! see either all of a cycle's samples or none of them. The control mutex
//! (running / stop flags) is never held by the loop while it holds the store.
//! Poisoned locks are recovered: a panicking reader must not take the loop down.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hwsampler_core::{EngineConfig, SamplingEngine, HandleRegistry, DeviceId, SourceError};
//! use hwsampler_core::source::RawReading;
//!
//! let power = Arc::new(|_: DeviceId, since: u64| -> Result<Vec<RawReading>, SourceError> {
//!     Ok(vec![RawReading::new(since + 1, 120_000)])
//! });
//! let registry = HandleRegistry::new(vec![DeviceId(0)]).with_source("power", power)?;
//! let handles = registry.expand("power")?;
//!
//! let engine = SamplingEngine::with_system_clock(EngineConfig::new(Duration::from_millis(10)))?;
//! engine.register(handles.clone())?;
//! engine.start()?;
//! std::thread::sleep(Duration::from_millis(30));
//! engine.stop();
//! engine.join();
//!
//! let series = engine.read(handles[0].key())?;
//! assert!(!series.is_empty());
//! # Ok::<(), hwsampler_core::SamplerError>(())
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::clock::{TickMapping, Ticks};
use crate::config::{EngineConfig, ShutdownMode};
use crate::errors::{SamplerError, SamplerResult, SourceError};
use crate::handle::{HandleKey, MetricHandle};
use crate::source::RawReading;
use crate::store::{push_ordered, Sample, SampleStore, Series};
use crate::time::{to_unix_micros, TimeManager, WallTime};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Query one handle, turning a panicking source into a [`SourceError`]
fn query_contained(handle: &MetricHandle, since: u64) -> Result<Vec<RawReading>, SourceError> {
    panic::catch_unwind(AssertUnwindSafe(|| handle.source().query(handle.device(), since)))
        .unwrap_or_else(|payload| Err(SourceError::new(format!("panicked: {}", panic_message(&*payload)))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Poll cycles completed
    pub cycles_completed: u64,
    /// Samples appended across all handles
    pub samples_collected: u64,
    /// Metric Source queries that failed
    pub source_failures: u64,
    /// Cycles stamped with the fallback clock
    pub unsynchronized_cycles: u64,
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Samples appended in this cycle
    pub samples: usize,
    /// Handles whose query failed
    pub failures: usize,
    /// Whether the cycle ran on the fallback clock
    pub from_fallback: bool,
}

#[derive(Default)]
struct StatsCounters {
    cycles: AtomicU64,
    samples: AtomicU64,
    source_failures: AtomicU64,
    unsynchronized: AtomicU64,
}

#[derive(Debug, Default)]
struct LoopControl {
    running: bool,
    stop_requested: bool,
}

struct Shared {
    config: EngineConfig,
    time: TimeManager,
    store: Mutex<SampleStore>,
    control: Mutex<LoopControl>,
    wake: Condvar,
    last_poll: Mutex<WallTime>,
    stats: StatsCounters,
}

/// Clears the running flag when the loop exits, including by panic
struct RunningGuard<'a> {
    shared: &'a Shared,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut control = lock(&self.shared.control);
        control.running = false;
        control.stop_requested = false;
    }
}

impl Shared {
    fn begin(&self) -> SamplerResult<()> {
        let mut control = lock(&self.control);
        if control.running {
            return Err(SamplerError::AlreadyRunning);
        }
        control.running = true;
        control.stop_requested = false;
        Ok(())
    }

    fn sampling_loop(&self) {
        let _guard = RunningGuard { shared: self };
        info!(
            "sampling loop started (interval {:?}, {} handles)",
            self.config.interval,
            lock(&self.store).len()
        );

        while !lock(&self.control).stop_requested {
            self.poll_cycle();
            if !self.sleep_interval() {
                break;
            }
        }

        info!(
            "sampling loop exited after {} cycles",
            self.stats.cycles.load(Ordering::Relaxed)
        );
    }

    /// Sleep for one interval; false once a stop has been requested
    fn sleep_interval(&self) -> bool {
        let control = lock(&self.control);
        if control.stop_requested {
            return false;
        }

        match self.config.shutdown_mode {
            ShutdownMode::Interrupt => {
                let (control, _) = self
                    .wake
                    .wait_timeout_while(control, self.config.interval, |c| !c.stop_requested)
                    .unwrap_or_else(PoisonError::into_inner);
                !control.stop_requested
            }
            ShutdownMode::FinishInterval => {
                drop(control);
                thread::sleep(self.config.interval);
                !lock(&self.control).stop_requested
            }
        }
    }

    fn poll_cycle(&self) -> CycleReport {
        let t_poll = self.time.now();
        if t_poll.from_fallback {
            warn!("measurement clock not synchronized, stamping cycle with fallback clock");
            self.stats.unsynchronized.fetch_add(1, Ordering::Relaxed);
        }

        let since = to_unix_micros(*lock(&self.last_poll));
        let mut samples = 0;
        let mut failures = 0;
        {
            let mut store = lock(&self.store);
            for (handle, series) in store.entries_mut() {
                match query_contained(handle, since) {
                    Ok(readings) => samples += push_ordered(series, handle.key(), &readings),
                    Err(err) => {
                        failures += 1;
                        warn!("{}: {err}, skipping for this cycle", handle.name());
                    }
                }
            }
        }
        *lock(&self.last_poll) = self.time.now().time;

        let cycle = self.stats.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        self.stats.samples.fetch_add(samples as u64, Ordering::Relaxed);
        self.stats
            .source_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
        debug!("cycle {cycle}: {samples} samples, {failures} failed queries");

        CycleReport {
            samples,
            failures,
            from_fallback: t_poll.from_fallback,
        }
    }
}

/// Background sampler over a set of registered handles
///
/// Dropping the engine stops the loop and waits for the thread to exit.
pub struct SamplingEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SamplingEngine {
    /// Create a stopped engine
    ///
    /// The initial "last poll" time is taken now, so the first cycle collects
    /// readings newer than construction.
    pub fn new(config: EngineConfig, time: TimeManager) -> SamplerResult<Self> {
        config.validate()?;
        let last_poll = time.now().time;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                time,
                store: Mutex::new(SampleStore::new()),
                control: Mutex::new(LoopControl::default()),
                wake: Condvar::new(),
                last_poll: Mutex::new(last_poll),
                stats: StatsCounters::default(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Engine stamped by the host clock
    pub fn with_system_clock(config: EngineConfig) -> SamplerResult<Self> {
        Self::new(config, TimeManager::default())
    }

    /// Add handles, each with an empty series
    ///
    /// Only allowed while stopped, except for an empty batch, which is a
    /// no-op. The batch is checked as a whole: on a duplicate nothing is
    /// inserted.
    pub fn register(&self, handles: impl IntoIterator<Item = MetricHandle>) -> SamplerResult<()> {
        let handles: Vec<MetricHandle> = handles.into_iter().collect();
        if handles.is_empty() {
            return Ok(());
        }

        let control = lock(&self.shared.control);
        if control.running {
            return Err(SamplerError::AlreadyRunning);
        }

        let mut store = lock(&self.shared.store);
        let mut seen = HashSet::with_capacity(handles.len());
        for handle in &handles {
            let key = handle.key();
            if store.contains(key) || !seen.insert(key) {
                return Err(SamplerError::DuplicateHandle { key });
            }
        }
        for handle in handles {
            debug!("registered {} ({})", handle.name(), handle.key());
            store.insert(handle)?;
        }
        drop(control);
        Ok(())
    }

    /// Spawn the sampling loop on a background thread
    pub fn start(&self) -> SamplerResult<()> {
        self.shared.begin()?;

        let mut worker = lock(&self.worker);
        if let Some(previous) = worker.take() {
            // loop already exited, the flag says so
            let _ = previous.join();
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.config.thread_name.clone())
            .spawn(move || shared.sampling_loop());

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                lock(&self.shared.control).running = false;
                Err(SamplerError::Spawn(err.to_string()))
            }
        }
    }

    /// Run the sampling loop on the calling thread until [`stop`](Self::stop)
    pub fn run(&self) -> SamplerResult<()> {
        self.shared.begin()?;
        self.shared.sampling_loop();
        Ok(())
    }

    /// Run exactly one poll cycle on the calling thread
    pub fn poll_once(&self) -> SamplerResult<CycleReport> {
        let control = lock(&self.shared.control);
        if control.running {
            return Err(SamplerError::AlreadyRunning);
        }
        let report = self.shared.poll_cycle();
        drop(control);
        Ok(report)
    }

    /// Ask the loop to exit after its current cycle
    ///
    /// Idempotent and callable from any thread. Does not wait; use
    /// [`join`](Self::join) for that.
    pub fn stop(&self) {
        let mut control = lock(&self.shared.control);
        if control.running && !control.stop_requested {
            info!("stop requested");
            control.stop_requested = true;
        }
        self.shared.wake.notify_all();
    }

    /// Wait for the background thread, if any, to exit
    pub fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("sampling thread panicked");
            }
        }
    }

    /// Whether the loop is active
    pub fn is_running(&self) -> bool {
        lock(&self.shared.control).running
    }

    /// Copy of a handle's series
    pub fn read(&self, key: HandleKey) -> SamplerResult<Series> {
        lock(&self.shared.store).series(key).map(<[Sample]>::to_vec)
    }

    /// Copy of a handle's series converted into the tick domain
    pub fn readings(&self, key: HandleKey, mapping: TickMapping) -> SamplerResult<TickReadings> {
        Ok(TickReadings {
            samples: self.read(key)?.into_iter(),
            mapping,
        })
    }

    /// Whether a handle is registered
    pub fn contains(&self, key: HandleKey) -> bool {
        lock(&self.shared.store).contains(key)
    }

    /// Registered handles in registration order
    pub fn handles(&self) -> Vec<MetricHandle> {
        lock(&self.shared.store).handles().cloned().collect()
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        lock(&self.shared.store).len()
    }

    /// Check if no handle is registered
    pub fn is_empty(&self) -> bool {
        lock(&self.shared.store).is_empty()
    }

    /// Configured poll period
    pub fn interval(&self) -> Duration {
        self.shared.config.interval
    }

    /// Counter snapshot
    pub fn stats(&self) -> EngineStats {
        let stats = &self.shared.stats;
        EngineStats {
            cycles_completed: stats.cycles.load(Ordering::Relaxed),
            samples_collected: stats.samples.load(Ordering::Relaxed),
            source_failures: stats.source_failures.load(Ordering::Relaxed),
            unsynchronized_cycles: stats.unsynchronized.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SamplingEngine {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

/// One-shot iterator of `(ticks, value)` pairs over a copied series
#[derive(Debug)]
pub struct TickReadings {
    samples: std::vec::IntoIter<Sample>,
    mapping: TickMapping,
}

impl Iterator for TickReadings {
    type Item = (Ticks, u64);

    fn next(&mut self) -> Option<Self::Item> {
        self.samples
            .next()
            .map(|sample| (self.mapping.to_ticks(sample.timestamp), sample.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.samples.size_hint()
    }
}

impl ExactSizeIterator for TickReadings {}
