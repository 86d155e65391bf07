//! Per-handle time-series storage
//!
//! ## Overview
//!
//! The store maps each registered [`HandleKey`] to an append-only series of
//! [`Sample`]s. It is a plain data structure with no locking of its own; the
//! engine wraps it in a single mutex so one poll cycle's appends commit
//! together and readers never see half a cycle.
//!
//! ## Invariants
//!
//! - Handles are only added through [`SampleStore::insert`]; reading an unknown
//!   key is an error and never creates an entry
//! - Entries are never removed
//! - Within one series, timestamps are non-decreasing. Each appended batch is
//!   sorted by timestamp first; only a reading older than a sample stored by an
//!   earlier append is rejected
//! - Iteration follows registration order
//!
//! ```rust
//! use std::sync::Arc;
//! use hwsampler_core::store::SampleStore;
//! use hwsampler_core::source::RawReading;
//! use hwsampler_core::{DeviceId, HandleKey, MetricHandle, SourceError, SourceId};
//!
//! let key = HandleKey::new(DeviceId(0), SourceId(0));
//! let source = Arc::new(|_: DeviceId, _: u64| -> Result<Vec<RawReading>, SourceError> { Ok(vec![]) });
//! let mut store = SampleStore::new();
//! store.insert(MetricHandle::new("power on device 0", key, source))?;
//!
//! store.append(key, &[RawReading::new(100_000, 5)])?;
//! assert_eq!(store.series(key)?.len(), 1);
//! # Ok::<(), hwsampler_core::SamplerError>(())
//! ```

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::{SamplerError, SamplerResult};
use crate::handle::{HandleKey, MetricHandle};
use crate::source::RawReading;
use crate::time::{from_unix_micros, WallTime};

/// One stored observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// When the hardware took the reading
    pub timestamp: WallTime,
    /// Opaque value
    pub value: u64,
}

impl Sample {
    /// Create a sample
    pub const fn new(timestamp: WallTime, value: u64) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered samples for one handle
pub type Series = Vec<Sample>;

struct Entry {
    handle: MetricHandle,
    series: Series,
}

/// Mapping from handle to its accumulated series
#[derive(Default)]
pub struct SampleStore {
    entries: Vec<Entry>,
    index: HashMap<HandleKey, usize>,
}

impl SampleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle with an empty series
    pub fn insert(&mut self, handle: MetricHandle) -> SamplerResult<()> {
        let key = handle.key();
        if self.index.contains_key(&key) {
            return Err(SamplerError::DuplicateHandle { key });
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(Entry {
            handle,
            series: Series::new(),
        });
        Ok(())
    }

    /// Check whether a handle is registered
    pub fn contains(&self, key: HandleKey) -> bool {
        self.index.contains_key(&key)
    }

    /// Accumulated series for a handle
    pub fn series(&self, key: HandleKey) -> SamplerResult<&[Sample]> {
        self.entry(key).map(|entry| entry.series.as_slice())
    }

    /// Append raw readings to a handle's series
    ///
    /// Returns how many readings were stored. The batch is stably sorted by
    /// timestamp; readings older than the series tail before this call are
    /// dropped to keep the series ordered.
    pub fn append(&mut self, key: HandleKey, readings: &[RawReading]) -> SamplerResult<usize> {
        let idx = *self
            .index
            .get(&key)
            .ok_or(SamplerError::NotRegistered { key })?;
        Ok(push_ordered(&mut self.entries[idx].series, key, readings))
    }

    /// Registered handles in registration order
    pub fn handles(&self) -> impl Iterator<Item = &MetricHandle> {
        self.entries.iter().map(|entry| &entry.handle)
    }

    /// Handles paired with their series, for the poll cycle
    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&MetricHandle, &mut Series)> {
        self.entries
            .iter_mut()
            .map(|entry| (&entry.handle, &mut entry.series))
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no handle is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Samples stored across all handles
    pub fn total_samples(&self) -> usize {
        self.entries.iter().map(|entry| entry.series.len()).sum()
    }

    fn entry(&self, key: HandleKey) -> SamplerResult<&Entry> {
        self.index
            .get(&key)
            .map(|&idx| &self.entries[idx])
            .ok_or(SamplerError::NotRegistered { key })
    }
}

/// Push a batch onto `series` in timestamp order
///
/// Ties keep the order the source returned them in. Readings older than the
/// tail left by a previous batch are dropped.
pub(crate) fn push_ordered(series: &mut Series, key: HandleKey, readings: &[RawReading]) -> usize {
    let mut batch: Vec<&RawReading> = readings.iter().collect();
    batch.sort_by_key(|reading| reading.timestamp_micros);

    let tail = series.last().map(|last| last.timestamp);
    let mut stored = 0;
    for reading in batch {
        let timestamp = from_unix_micros(reading.timestamp_micros);
        if tail.is_some_and(|tail| timestamp < tail) {
            warn!("dropping reading for {key} at {timestamp}, older than stored samples");
            continue;
        }
        series.push(Sample::new(timestamp, reading.value));
        stored += 1;
    }
    stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use crate::handle::{DeviceId, SourceId};
    use crate::source::MetricSource;
    use std::sync::Arc;

    fn handle(device: u32) -> MetricHandle {
        let source: Arc<dyn MetricSource> =
            Arc::new(|_: DeviceId, _: u64| -> Result<Vec<RawReading>, SourceError> { Ok(Vec::new()) });
        MetricHandle::new(
            format!("power on device {device}"),
            HandleKey::new(DeviceId(device), SourceId(0)),
            source,
        )
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut store = SampleStore::new();
        store.insert(handle(0)).unwrap();
        let err = store.insert(handle(0)).unwrap_err();
        assert!(matches!(err, SamplerError::DuplicateHandle { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_key_is_not_inserted() {
        let mut store = SampleStore::new();
        store.insert(handle(0)).unwrap();

        let missing = HandleKey::new(DeviceId(9), SourceId(0));
        assert!(matches!(
            store.series(missing),
            Err(SamplerError::NotRegistered { .. })
        ));
        assert!(store.append(missing, &[RawReading::new(1, 1)]).is_err());
        assert_eq!(store.len(), 1);
        assert!(!store.contains(missing));
    }

    fn values(store: &SampleStore, key: HandleKey) -> Vec<u64> {
        store.series(key).unwrap().iter().map(|s| s.value).collect()
    }

    #[test]
    fn append_sorts_batch_and_keeps_ties_in_order() {
        let mut store = SampleStore::new();
        let h = handle(0);
        let key = h.key();
        store.insert(h).unwrap();

        let stored = store
            .append(
                key,
                &[
                    RawReading::new(100, 1),
                    RawReading::new(100, 2),
                    RawReading::new(50, 3),
                    RawReading::new(200, 4),
                ],
            )
            .unwrap();

        assert_eq!(stored, 4);
        assert_eq!(values(&store, key), vec![3, 1, 2, 4]);
    }

    #[test]
    fn unsorted_batch_is_stored_whole() {
        let mut store = SampleStore::new();
        let h = handle(0);
        let key = h.key();
        store.insert(h).unwrap();

        let readings = [
            RawReading::new(300, 3),
            RawReading::new(100, 1),
            RawReading::new(200, 2),
        ];
        assert_eq!(store.append(key, &readings).unwrap(), 3);
        assert_eq!(values(&store, key), vec![1, 2, 3]);
    }

    #[test]
    fn reading_older_than_previous_batch_is_dropped() {
        let mut store = SampleStore::new();
        let h = handle(0);
        let key = h.key();
        store.insert(h).unwrap();

        store.append(key, &[RawReading::new(500, 1)]).unwrap();
        let stored = store
            .append(key, &[RawReading::new(400, 2), RawReading::new(500, 3)])
            .unwrap();

        assert_eq!(stored, 1);
        assert_eq!(values(&store, key), vec![1, 3]);
    }

    #[test]
    fn handles_follow_registration_order() {
        let mut store = SampleStore::new();
        for device in [3, 1, 2] {
            store.insert(handle(device)).unwrap();
        }
        let devices: Vec<u32> = store.handles().map(|h| h.device().0).collect();
        assert_eq!(devices, vec![3, 1, 2]);
    }

    #[test]
    fn sample_serializes_with_timestamp() {
        let sample = Sample::new(from_unix_micros(1_000_000), 7);
        let json = serde_json::to_string(&sample).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }
}
