//! Metric handles
//!
//! A handle names one (device, metric source) pair. Identity lives in the
//! small, `Copy` [`HandleKey`]; the store and every lookup are keyed by it, so
//! nothing holds a reference into a handle owned by someone else.
//!
//! [`MetricHandle`] adds the display name and the source to query. It is
//! immutable and cheap to clone (the source is behind an `Arc`), so the
//! registry, the engine and the plugin each keep their own copy.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::source::MetricSource;

/// Device identifier assigned by the vendor library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

/// Metric Source identifier assigned by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

/// Identity of a (device, metric source) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleKey {
    /// Device being sampled
    pub device: DeviceId,
    /// Metric being sampled
    pub source: SourceId,
}

impl HandleKey {
    /// Create a key
    pub const fn new(device: DeviceId, source: SourceId) -> Self {
        Self { device, source }
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source {} on device {}", self.source.0, self.device.0)
    }
}

/// A registered (device, metric source) pair
///
/// Equality and hashing consider only the [`HandleKey`].
#[derive(Clone)]
pub struct MetricHandle {
    name: String,
    key: HandleKey,
    source: Arc<dyn MetricSource>,
}

impl MetricHandle {
    /// Create a handle
    pub fn new(name: impl Into<String>, key: HandleKey, source: Arc<dyn MetricSource>) -> Self {
        Self {
            name: name.into(),
            key,
            source,
        }
    }

    /// Human-readable name, e.g. `"power on device 0"`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of this handle
    pub fn key(&self) -> HandleKey {
        self.key
    }

    /// Device being sampled
    pub fn device(&self) -> DeviceId {
        self.key.device
    }

    /// Source to query
    pub fn source(&self) -> &dyn MetricSource {
        self.source.as_ref()
    }
}

impl PartialEq for MetricHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for MetricHandle {}

impl Hash for MetricHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for MetricHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricHandle")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
