//! Shared fixtures for engine integration tests
//!
//! Provides:
//! - Scripted Metric Sources that replay a fixed answer per call
//! - Sources that fail or panic on chosen calls
//! - A polling wait helper for threaded tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hwsampler_core::{
    DeviceId, HandleKey, MetricHandle, MetricSource, RawReading, SourceError, SourceId,
};

/// Answer for one call
pub type Answer = Result<Vec<RawReading>, SourceError>;

/// Replays queued answers, then answers empty forever
#[derive(Default)]
pub struct ScriptedSource {
    answers: Mutex<VecDeque<Answer>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricSource for ScriptedSource {
    fn query(&self, _device: DeviceId, _since_micros: u64) -> Answer {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Fails every call
pub struct BrokenSource;

impl MetricSource for BrokenSource {
    fn query(&self, device: DeviceId, _since_micros: u64) -> Answer {
        Err(SourceError::new(format!("device {} not responding", device.0)))
    }
}

/// One new reading per call, timestamps strictly increasing
#[derive(Default)]
pub struct TickingSource {
    calls: AtomicUsize,
}

impl MetricSource for TickingSource {
    fn query(&self, _device: DeviceId, _since_micros: u64) -> Answer {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        Ok(vec![RawReading::new(1_000_000 + n * 1_000, n)])
    }
}

/// Panics on the chosen call numbers (1-based), one new reading otherwise
pub struct PanickingSource {
    panic_on: Vec<usize>,
    calls: AtomicUsize,
}

impl PanickingSource {
    pub fn on_calls(panic_on: impl IntoIterator<Item = usize>) -> Arc<Self> {
        Arc::new(Self {
            panic_on: panic_on.into_iter().collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricSource for PanickingSource {
    fn query(&self, _device: DeviceId, _since_micros: u64) -> Answer {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on.contains(&n) {
            panic!("driver fault on call {n}");
        }
        Ok(vec![RawReading::new(1_000_000 + n as u64 * 1_000, n as u64)])
    }
}

pub fn handle(name: &str, device: u32, source: Arc<dyn MetricSource>) -> MetricHandle {
    MetricHandle::new(
        name,
        HandleKey::new(DeviceId(device), SourceId(0)),
        source,
    )
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub const WAIT: Duration = Duration::from_secs(5);
