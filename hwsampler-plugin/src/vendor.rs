//! Vendor library lifecycle and device enumeration
//!
//! The vendor library (NVML or similar) is process-wide state that must be
//! initialized once before any query and shut down once at the end. Instead of
//! ambient globals, the plugin holds a [`VendorSession`]: opening it runs
//! `init`, dropping it runs `shutdown`.
//!
//! Failure policy:
//! - `init` fails: nothing can proceed, the error is returned
//! - `shutdown` fails: logged, since collected data is still good
//! - a device without permission: logged and skipped
//! - any other enumeration failure: returned

use hwsampler_core::DeviceId;
use log::{info, warn};
use thiserror::Error;

use crate::PluginResult;

/// Error reported by the vendor library
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation}: {message}")]
pub struct VendorError {
    /// Call that failed
    pub operation: &'static str,
    /// Vendor error string
    pub message: String,
}

impl VendorError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Result of probing one device index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Device can be queried
    Available(DeviceId),
    /// Device is counted but the process may not query it
    NoPermission,
}

/// Narrow interface to the vendor library
pub trait VendorLibrary: Send + Sync {
    /// Initialize the library
    fn init(&self) -> Result<(), VendorError>;

    /// Number of devices, including ones the process may not access
    fn device_count(&self) -> Result<u32, VendorError>;

    /// Probe the device at `index`
    fn device(&self, index: u32) -> Result<DeviceStatus, VendorError>;

    /// Release the library
    fn shutdown(&self) -> Result<(), VendorError>;
}

/// Initialized vendor library, shut down on drop
pub struct VendorSession<L: VendorLibrary> {
    library: L,
}

impl<L: VendorLibrary> VendorSession<L> {
    /// Initialize `library`
    pub fn open(library: L) -> PluginResult<Self> {
        library.init()?;
        info!("vendor library initialized");
        Ok(Self { library })
    }

    /// The initialized library
    pub fn library(&self) -> &L {
        &self.library
    }

    /// Devices the process may query, in index order
    pub fn visible_devices(&self) -> PluginResult<Vec<DeviceId>> {
        let count = self.library.device_count()?;
        let mut devices = Vec::with_capacity(count as usize);
        for index in 0..count {
            match self.library.device(index)? {
                DeviceStatus::Available(device) => devices.push(device),
                DeviceStatus::NoPermission => info!("no permission for device {index}, skipping"),
            }
        }
        Ok(devices)
    }
}

impl<L: VendorLibrary> Drop for VendorSession<L> {
    fn drop(&mut self) {
        match self.library.shutdown() {
            Ok(()) => info!("vendor library shut down"),
            Err(err) => warn!("could not shut down vendor library: {err}"),
        }
    }
}
