//! Sampling plugin lifecycle
//!
//! Ties the vendor session, the metric catalog, the sampling engine and the
//! clock bridge together behind the hooks a measurement environment calls:
//! property discovery, start, stop, and post-mortem value retrieval.
//!
//! ```rust
//! use std::sync::Arc;
//! use hwsampler_core::clock::InstantTicks;
//! use hwsampler_core::{DeviceId, RawReading, SourceError};
//! use hwsampler_plugin::*;
//!
//! struct OneGpu;
//!
//! impl VendorLibrary for OneGpu {
//!     fn init(&self) -> Result<(), VendorError> { Ok(()) }
//!     fn device_count(&self) -> Result<u32, VendorError> { Ok(1) }
//!     fn device(&self, index: u32) -> Result<DeviceStatus, VendorError> {
//!         Ok(DeviceStatus::Available(DeviceId(index)))
//!     }
//!     fn shutdown(&self) -> Result<(), VendorError> { Ok(()) }
//! }
//!
//! let power = Arc::new(|_: DeviceId, _: u64| -> Result<Vec<RawReading>, SourceError> { Ok(vec![]) });
//! let catalog = MetricCatalog::new().define(
//!     "power",
//!     MetricDescriptor::new("Power draw", "mW", ValueType::Uint, MeasureKind::Absolute),
//!     power,
//! );
//!
//! let plugin = SamplingPlugin::new(OneGpu, catalog, PluginConfig::default(), Arc::new(InstantTicks::new()))?;
//! let properties = plugin.metric_properties("power")?;
//! assert_eq!(properties[0].name, "power on device 0");
//!
//! plugin.start()?;
//! plugin.stop()?;
//! let handle = plugin.handle("power on device 0").unwrap();
//! let mut cursor = VecCursor::new();
//! plugin.all_values(handle.key(), &mut cursor)?;
//! # Ok::<(), PluginError>(())
//! ```

use std::sync::{Arc, PoisonError};

use hwsampler_core::clock::{AnchoredClock, ClockBridge, SharedClockBridge, TickSource};
use hwsampler_core::{
    ClockAnchor, DeviceId, HandleKey, HandleRegistry, MetricHandle, SamplerError, SamplingEngine, Ticks,
    TimeManager,
};
use log::info;
use serde::Serialize;

use crate::config::PluginConfig;
use crate::cursor::Cursor;
use crate::properties::{MetricCatalog, MetricProperty};
use crate::vendor::{VendorLibrary, VendorSession};
use crate::{PluginError, PluginResult};

#[derive(Serialize)]
struct ExportedSeries<'a> {
    name: &'a str,
    key: HandleKey,
    readings: Vec<ExportedReading>,
}

#[derive(Serialize)]
struct ExportedReading {
    ticks: Ticks,
    value: u64,
}

/// Sampling plugin over one vendor library
pub struct SamplingPlugin<L: VendorLibrary> {
    // fields drop in order: the engine joins its thread before the session shuts down
    engine: SamplingEngine,
    bridge: SharedClockBridge,
    ticks: Arc<dyn TickSource>,
    registry: HandleRegistry,
    catalog: MetricCatalog,
    devices: Vec<DeviceId>,
    session: VendorSession<L>,
}

impl<L: VendorLibrary> SamplingPlugin<L> {
    /// Initialize the vendor library and prepare a stopped engine
    pub fn new(
        library: L,
        catalog: MetricCatalog,
        config: PluginConfig,
        ticks: Arc<dyn TickSource>,
    ) -> PluginResult<Self> {
        let session = VendorSession::open(library)?;
        let devices = session.visible_devices()?;
        info!("{} visible devices", devices.len());

        let registry = catalog.registry(devices.clone(), &config.device_label)?;
        let bridge = ClockBridge::new(config.ticks_per_second).shared();
        let time = TimeManager::new(Arc::new(AnchoredClock::new(Arc::clone(&bridge))));
        let engine = SamplingEngine::new(config.engine_config(), time)?;

        Ok(Self {
            engine,
            bridge,
            ticks,
            registry,
            catalog,
            devices,
            session,
        })
    }

    /// Expand `metric_name` over all devices, register the handles and
    /// declare them
    ///
    /// Asking again for the same metric returns the same properties without
    /// registering twice.
    pub fn metric_properties(&self, metric_name: &str) -> PluginResult<Vec<MetricProperty>> {
        info!("metric properties requested for '{metric_name}'");

        let handles = self.registry.expand(metric_name)?;
        let descriptor = self
            .catalog
            .descriptor(metric_name)
            .ok_or_else(|| SamplerError::UnknownMetric {
                name: metric_name.to_string(),
            })?;

        let fresh: Vec<MetricHandle> = handles
            .iter()
            .filter(|handle| !self.engine.contains(handle.key()))
            .cloned()
            .collect();
        self.engine.register(fresh)?;

        Ok(handles
            .iter()
            .map(|handle| MetricProperty::for_handle(handle, descriptor))
            .collect())
    }

    /// Acknowledge a handle the environment decided to record
    pub fn add_metric(&self, key: HandleKey) -> PluginResult<MetricHandle> {
        let handle = self
            .handle_by_key(key)
            .ok_or(SamplerError::NotRegistered { key })?;
        info!("add metric {} on device {}", handle.name(), key.device.0);
        Ok(handle)
    }

    /// Registered handle by name
    pub fn handle(&self, name: &str) -> Option<MetricHandle> {
        self.engine
            .handles()
            .into_iter()
            .find(|handle| handle.name() == name)
    }

    /// Anchor the clocks and start sampling
    ///
    /// Fails without recording an anchor if sampling is already running.
    pub fn start(&self) -> PluginResult<()> {
        if self.engine.is_running() {
            return Err(SamplerError::AlreadyRunning.into());
        }
        let anchor = self.synchronize_point()?;
        self.engine.start()?;
        info!("measurement started at tick {}", anchor.ticks);
        Ok(())
    }

    /// Stop sampling, wait for the loop, and anchor the clocks again
    pub fn stop(&self) -> PluginResult<()> {
        self.engine.stop();
        self.engine.join();
        let anchor = self.synchronize_point()?;
        info!("measurement stopped at tick {}", anchor.ticks);
        Ok(())
    }

    /// Write every sample of `key` to `cursor`, converted to ticks
    ///
    /// Returns the number of points written.
    pub fn all_values<C: Cursor>(&self, key: HandleKey, mut cursor: C) -> PluginResult<usize> {
        let mapping = self
            .bridge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mapping()?;

        let mut written = 0;
        for (ticks, value) in self.engine.readings(key, mapping)? {
            cursor.write(ticks, value);
            written += 1;
        }
        info!("emitted {written} values for {key}");
        Ok(written)
    }

    /// Series of `key` as JSON `(ticks, value)` records
    pub fn export_json(&self, key: HandleKey) -> PluginResult<String> {
        let handle = self
            .handle_by_key(key)
            .ok_or(SamplerError::NotRegistered { key })?;
        let mapping = self
            .bridge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mapping()?;

        let export = ExportedSeries {
            name: handle.name(),
            key,
            readings: self
                .engine
                .readings(key, mapping)?
                .map(|(ticks, value)| ExportedReading { ticks, value })
                .collect(),
        };
        serde_json::to_string(&export).map_err(|err| PluginError::Serialization(err.to_string()))
    }

    /// Devices visible at startup
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// The underlying engine
    pub fn engine(&self) -> &SamplingEngine {
        &self.engine
    }

    /// The clock bridge shared with the engine's time source
    pub fn bridge(&self) -> &SharedClockBridge {
        &self.bridge
    }

    /// The initialized vendor library
    pub fn library(&self) -> &L {
        self.session.library()
    }

    fn handle_by_key(&self, key: HandleKey) -> Option<MetricHandle> {
        self.engine
            .handles()
            .into_iter()
            .find(|handle| handle.key() == key)
    }

    fn synchronize_point(&self) -> PluginResult<ClockAnchor> {
        Ok(self
            .bridge
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .synchronize_point(self.ticks.as_ref())?)
    }
}
