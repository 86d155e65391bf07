//! Handle Registry
//!
//! Builds [`MetricHandle`]s from the enumerated device list and a table of
//! named Metric Sources. Expansion is deterministic: one handle per device,
//! in enumeration order, named `"{metric} on {label} {index}"`.
//!
//! An unknown metric name fails here, at registration time, rather than
//! surfacing later as an empty series.
//!
//! ```rust
//! use std::sync::Arc;
//! use hwsampler_core::registry::HandleRegistry;
//! use hwsampler_core::source::RawReading;
//! use hwsampler_core::{DeviceId, SourceError};
//!
//! let power = Arc::new(|_: DeviceId, _: u64| -> Result<Vec<RawReading>, SourceError> { Ok(vec![]) });
//! let registry = HandleRegistry::new(vec![DeviceId(0), DeviceId(1)])
//!     .with_source("power", power)?;
//!
//! let handles = registry.expand("power")?;
//! assert_eq!(handles[1].name(), "power on device 1");
//! assert!(registry.expand("fan_speed").is_err());
//! # Ok::<(), hwsampler_core::SamplerError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::errors::{SamplerError, SamplerResult};
use crate::handle::{DeviceId, HandleKey, MetricHandle, SourceId};
use crate::source::MetricSource;

/// Label used in handle names when none is configured
pub const DEFAULT_DEVICE_LABEL: &str = "device";

struct SourceEntry {
    name: String,
    source: Arc<dyn MetricSource>,
}

/// Named Metric Sources plus the device list they expand over
pub struct HandleRegistry {
    devices: Vec<DeviceId>,
    sources: Vec<SourceEntry>,
    by_name: HashMap<String, SourceId>,
    device_label: String,
}

impl HandleRegistry {
    /// Registry over `devices`, in enumeration order
    pub fn new(devices: Vec<DeviceId>) -> Self {
        Self {
            devices,
            sources: Vec::new(),
            by_name: HashMap::new(),
            device_label: DEFAULT_DEVICE_LABEL.to_string(),
        }
    }

    /// Use `label` in handle names instead of `"device"`
    pub fn with_device_label(mut self, label: impl Into<String>) -> Self {
        self.device_label = label.into();
        self
    }

    /// Builder form of [`HandleRegistry::add_source`]
    pub fn with_source(
        mut self,
        name: impl Into<String>,
        source: Arc<dyn MetricSource>,
    ) -> SamplerResult<Self> {
        self.add_source(name, source)?;
        Ok(self)
    }

    /// Define a metric name; ids are assigned in definition order
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        source: Arc<dyn MetricSource>,
    ) -> SamplerResult<SourceId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(SamplerError::DuplicateMetric { name });
        }
        let id = SourceId(self.sources.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.sources.push(SourceEntry { name, source });
        Ok(id)
    }

    /// Id of a defined metric
    pub fn source_id(&self, name: &str) -> Option<SourceId> {
        self.by_name.get(name).copied()
    }

    /// Name of a defined metric
    pub fn source_name(&self, id: SourceId) -> Option<&str> {
        self.sources
            .get(id.0 as usize)
            .map(|entry| entry.name.as_str())
    }

    /// Enumerated devices
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// One handle per device for `metric_name`
    pub fn expand(&self, metric_name: &str) -> SamplerResult<Vec<MetricHandle>> {
        let id = self
            .source_id(metric_name)
            .ok_or_else(|| SamplerError::UnknownMetric {
                name: metric_name.to_string(),
            })?;
        let source = &self.sources[id.0 as usize].source;

        let handles: Vec<MetricHandle> = self
            .devices
            .iter()
            .enumerate()
            .map(|(index, &device)| {
                MetricHandle::new(
                    format!("{metric_name} on {} {index}", self.device_label),
                    HandleKey::new(device, id),
                    Arc::clone(source),
                )
            })
            .collect();

        debug!("expanded '{metric_name}' into {} handles", handles.len());
        Ok(handles)
    }
}
