//! End-to-end plugin lifecycle tests
//!
//! A fake vendor library with three devices (one without permission) and a
//! Metric Source stamping readings with the host clock drive the plugin
//! through discovery, start, stop and post-mortem emission.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use hwsampler_core::clock::InstantTicks;
use hwsampler_core::{DeviceId, HandleKey, MetricSource, RawReading, SamplerError, SourceError, SourceId};
use hwsampler_plugin::{
    DeviceStatus, MeasureKind, MetricCatalog, MetricDescriptor, PluginConfig, PluginError,
    SamplingPlugin, ValueType, VecCursor, VendorError, VendorLibrary,
};

struct FakeGpus {
    shut_down: Arc<AtomicBool>,
    shutdowns: Arc<AtomicUsize>,
}

impl VendorLibrary for FakeGpus {
    fn init(&self) -> Result<(), VendorError> {
        Ok(())
    }

    fn device_count(&self) -> Result<u32, VendorError> {
        Ok(3)
    }

    fn device(&self, index: u32) -> Result<DeviceStatus, VendorError> {
        match index {
            1 => Ok(DeviceStatus::NoPermission),
            _ => Ok(DeviceStatus::Available(DeviceId(index))),
        }
    }

    fn shutdown(&self) -> Result<(), VendorError> {
        self.shut_down.store(true, Ordering::SeqCst);
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reports one reading per query, stamped with the host clock
struct PowerSource {
    counter: AtomicU64,
    shut_down: Arc<AtomicBool>,
    queried_after_shutdown: Arc<AtomicBool>,
}

impl MetricSource for PowerSource {
    fn query(&self, device: DeviceId, since_micros: u64) -> Result<Vec<RawReading>, SourceError> {
        if self.shut_down.load(Ordering::SeqCst) {
            self.queried_after_shutdown.store(true, Ordering::SeqCst);
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RawReading::new(now.max(since_micros + 1), 100_000 + u64::from(device.0) + n)])
    }
}

struct Fixture {
    plugin: SamplingPlugin<FakeGpus>,
    shutdowns: Arc<AtomicUsize>,
    queried_after_shutdown: Arc<AtomicBool>,
}

fn fixture() -> Fixture {
    let shut_down = Arc::new(AtomicBool::new(false));
    let shutdowns = Arc::new(AtomicUsize::new(0));
    let queried_after_shutdown = Arc::new(AtomicBool::new(false));

    let power = Arc::new(PowerSource {
        counter: AtomicU64::new(0),
        shut_down: Arc::clone(&shut_down),
        queried_after_shutdown: Arc::clone(&queried_after_shutdown),
    });
    let failing = Arc::new(|_: DeviceId, _: u64| -> Result<Vec<RawReading>, SourceError> {
        Err(SourceError::new("not supported"))
    });
    let catalog = MetricCatalog::new()
        .define(
            "power",
            MetricDescriptor::new("Power draw", "mW", ValueType::Uint, MeasureKind::Absolute),
            power,
        )
        .define(
            "ecc_errors",
            MetricDescriptor::new("ECC errors", "#", ValueType::Uint, MeasureKind::Accumulated),
            failing,
        );

    let config = PluginConfig {
        interval_ms: 2,
        ..PluginConfig::default()
    };
    let library = FakeGpus {
        shut_down,
        shutdowns: Arc::clone(&shutdowns),
    };
    let plugin = SamplingPlugin::new(library, catalog, config, Arc::new(InstantTicks::new())).unwrap();

    Fixture {
        plugin,
        shutdowns,
        queried_after_shutdown,
    }
}

fn wait_for_cycles(plugin: &SamplingPlugin<FakeGpus>, cycles: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while plugin.engine().stats().cycles_completed < cycles && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn properties_follow_visible_devices() {
    let fx = fixture();
    assert_eq!(fx.plugin.devices(), &[DeviceId(0), DeviceId(2)]);

    let properties = fx.plugin.metric_properties("power").unwrap();
    let names: Vec<&str> = properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["power on device 0", "power on device 1"]);
    assert!(properties.iter().all(|p| p.unit == "mW"));

    let second = fx.plugin.metric_properties("power").unwrap();
    assert_eq!(properties, second);
    assert_eq!(fx.plugin.engine().len(), 2);

    let handle = fx.plugin.handle("power on device 1").unwrap();
    assert_eq!(handle.device(), DeviceId(2));
}

#[test]
fn unknown_metric_fails_at_registration() {
    let fx = fixture();
    assert_eq!(
        fx.plugin.metric_properties("fan_speed"),
        Err(PluginError::Sampler(SamplerError::UnknownMetric {
            name: "fan_speed".into()
        }))
    );
    assert!(fx.plugin.engine().is_empty());
}

#[test]
fn full_measurement_emits_monotonic_ticks() {
    let fx = fixture();
    fx.plugin.metric_properties("power").unwrap();
    fx.plugin.metric_properties("ecc_errors").unwrap();
    let power0 = fx.plugin.handle("power on device 0").unwrap();
    let ecc0 = fx.plugin.handle("ecc_errors on device 0").unwrap();
    fx.plugin.add_metric(power0.key()).unwrap();

    fx.plugin.start().unwrap();
    wait_for_cycles(&fx.plugin, 5);
    fx.plugin.stop().unwrap();

    let mut cursor = VecCursor::new();
    let written = fx.plugin.all_values(power0.key(), &mut cursor).unwrap();
    assert!(written >= 5);
    assert_eq!(written, cursor.points.len());
    assert!(cursor.points.windows(2).all(|w| w[0].0 <= w[1].0));

    let mut empty = VecCursor::new();
    assert_eq!(fx.plugin.all_values(ecc0.key(), &mut empty).unwrap(), 0);

    let stats = fx.plugin.engine().stats();
    assert!(stats.source_failures >= 2 * 5);
    assert_eq!(stats.unsynchronized_cycles, 0);
}

#[test]
fn second_start_leaves_anchors_untouched() {
    let fx = fixture();
    fx.plugin.metric_properties("power").unwrap();
    fx.plugin.start().unwrap();
    let first = fx.plugin.bridge().read().unwrap().latest_anchor();

    assert_eq!(
        fx.plugin.start(),
        Err(PluginError::Sampler(SamplerError::AlreadyRunning))
    );
    assert_eq!(fx.plugin.bridge().read().unwrap().latest_anchor(), first);
    fx.plugin.stop().unwrap();
}

#[test]
fn properties_can_be_requested_again_while_sampling() {
    let fx = fixture();
    let before = fx.plugin.metric_properties("power").unwrap();
    fx.plugin.start().unwrap();

    assert_eq!(fx.plugin.metric_properties("power").unwrap(), before);
    assert!(fx.plugin.engine().is_running());
    fx.plugin.stop().unwrap();
}

#[test]
fn values_before_any_anchor_are_refused() {
    let fx = fixture();
    fx.plugin.metric_properties("power").unwrap();
    let key = fx.plugin.handle("power on device 0").unwrap().key();

    let err = fx.plugin.all_values(key, VecCursor::new()).unwrap_err();
    assert_eq!(err, PluginError::Sampler(SamplerError::ClockNotSynchronized));
}

#[test]
fn cycles_before_start_use_the_fallback_clock() {
    let fx = fixture();
    fx.plugin.metric_properties("power").unwrap();

    let report = fx.plugin.engine().poll_once().unwrap();
    assert!(report.from_fallback);
    assert_eq!(fx.plugin.engine().stats().unsynchronized_cycles, 1);
}

#[test]
fn unknown_handle_is_reported_on_read() {
    let fx = fixture();
    fx.plugin.metric_properties("power").unwrap();
    fx.plugin.start().unwrap();
    fx.plugin.stop().unwrap();

    let stranger = HandleKey::new(DeviceId(1), SourceId(0));
    assert!(matches!(
        fx.plugin.all_values(stranger, VecCursor::new()),
        Err(PluginError::Sampler(SamplerError::NotRegistered { .. }))
    ));
    assert!(fx.plugin.add_metric(stranger).is_err());
    assert_eq!(fx.plugin.engine().len(), 2);
}

#[test]
fn export_json_lists_points() {
    let fx = fixture();
    fx.plugin.metric_properties("power").unwrap();
    let key = fx.plugin.handle("power on device 0").unwrap().key();

    fx.plugin.start().unwrap();
    wait_for_cycles(&fx.plugin, 3);
    fx.plugin.stop().unwrap();

    let json: serde_json::Value = serde_json::from_str(&fx.plugin.export_json(key).unwrap()).unwrap();
    assert_eq!(json["name"], "power on device 0");
    assert!(json["readings"].as_array().unwrap().len() >= 3);
    assert!(json["readings"][0]["ticks"].is_u64());
}

#[test]
fn engine_stops_before_vendor_shutdown() {
    let fx = fixture();
    fx.plugin.metric_properties("power").unwrap();
    fx.plugin.start().unwrap();
    wait_for_cycles(&fx.plugin, 2);

    let Fixture {
        plugin,
        shutdowns,
        queried_after_shutdown,
    } = fx;
    drop(plugin);

    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    assert!(!queried_after_shutdown.load(Ordering::SeqCst));
}

#[test]
fn interval_comes_from_environment_lookup() {
    let config = PluginConfig::from_lookup("NVML", |key| (key == "NVML_INTERVAL").then(|| "25".to_string())).unwrap();
    assert_eq!(config.engine_config().interval, Duration::from_millis(25));
}
