//! Mock modem discovery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::Result;
use crate::discovery::{DeviceDiscovery, DeviceStatus};

/// Discovery reporting whatever its handle says.
///
/// A mode switch moves a `WrongMode` device to `Present`, like a modem that
/// re-enumerates after the switch.
#[derive(Debug)]
pub struct MockDiscovery {
    status: Arc<Mutex<DeviceStatus>>,
    switches: Arc<AtomicUsize>,
}

impl MockDiscovery {
    /// Create discovery starting with `status`.
    pub fn new(status: DeviceStatus) -> (Self, MockDiscoveryHandle) {
        let status = Arc::new(Mutex::new(status));
        let switches = Arc::new(AtomicUsize::new(0));
        let handle = MockDiscoveryHandle {
            status: Arc::clone(&status),
            switches: Arc::clone(&switches),
        };
        (Self { status, switches }, handle)
    }

    /// Discovery that always finds the device.
    pub fn present() -> Self {
        Self::new(DeviceStatus::Present).0
    }
}

impl DeviceDiscovery for MockDiscovery {
    fn probe(&mut self) -> DeviceStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mode_switch(&mut self) -> Result<()> {
        self.switches.fetch_add(1, Ordering::SeqCst);
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == DeviceStatus::WrongMode {
            *status = DeviceStatus::Present;
        }
        Ok(())
    }
}

/// Control handle for a [`MockDiscovery`].
#[derive(Debug, Clone)]
pub struct MockDiscoveryHandle {
    status: Arc<Mutex<DeviceStatus>>,
    switches: Arc<AtomicUsize>,
}

impl MockDiscoveryHandle {
    /// Change what the next probe reports.
    pub fn set_status(&self, status: DeviceStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Number of mode switches triggered.
    pub fn mode_switches(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }
}
