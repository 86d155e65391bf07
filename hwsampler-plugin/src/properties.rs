//! Metric catalog and property declarations
//!
//! The catalog maps a metric name to the Metric Source that samples it and to
//! the descriptive metadata the measurement environment needs (unit, value
//! type, how consecutive values relate). The core never reads this metadata;
//! it only travels from here into [`MetricProperty`] declarations.

use std::sync::Arc;

use hwsampler_core::{DeviceId, HandleRegistry, MetricHandle, MetricSource, SamplerResult};
use serde::{Deserialize, Serialize};

/// Numeric type of the emitted values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Uint,
    Int,
    Double,
}

/// How a value relates to time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    /// Instantaneous reading, e.g. power draw
    Absolute,
    /// Change since the previous point
    Relative,
    /// Running total, e.g. energy counter
    Accumulated,
}

/// Metadata for one metric name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub description: String,
    pub unit: String,
    pub value_type: ValueType,
    pub measure: MeasureKind,
}

impl MetricDescriptor {
    pub fn new(
        description: impl Into<String>,
        unit: impl Into<String>,
        value_type: ValueType,
        measure: MeasureKind,
    ) -> Self {
        Self {
            description: description.into(),
            unit: unit.into(),
            value_type,
            measure,
        }
    }
}

/// Declaration of one handle to the measurement environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricProperty {
    /// Handle name, e.g. `"power on device 0"`
    pub name: String,
    pub description: String,
    pub unit: String,
    pub value_type: ValueType,
    pub measure: MeasureKind,
}

impl MetricProperty {
    /// Property for `handle` described by `descriptor`
    pub fn for_handle(handle: &MetricHandle, descriptor: &MetricDescriptor) -> Self {
        Self {
            name: handle.name().to_string(),
            description: descriptor.description.clone(),
            unit: descriptor.unit.clone(),
            value_type: descriptor.value_type,
            measure: descriptor.measure,
        }
    }
}

struct CatalogEntry {
    name: String,
    descriptor: MetricDescriptor,
    source: Arc<dyn MetricSource>,
}

/// Metric names the plugin can sample
#[derive(Default)]
pub struct MetricCatalog {
    entries: Vec<CatalogEntry>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric; a later definition with the same name is rejected when
    /// the registry is built
    pub fn define(
        mut self,
        name: impl Into<String>,
        descriptor: MetricDescriptor,
        source: Arc<dyn MetricSource>,
    ) -> Self {
        self.entries.push(CatalogEntry {
            name: name.into(),
            descriptor,
            source,
        });
        self
    }

    /// Metadata for `name`
    pub fn descriptor(&self, name: &str) -> Option<&MetricDescriptor> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.descriptor)
    }

    /// Defined metric names, in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Registry expanding these metrics over `devices`
    pub fn registry(&self, devices: Vec<DeviceId>, device_label: &str) -> SamplerResult<HandleRegistry> {
        let mut registry = HandleRegistry::new(devices).with_device_label(device_label);
        for entry in &self.entries {
            registry.add_source(entry.name.clone(), Arc::clone(&entry.source))?;
        }
        Ok(registry)
    }
}
