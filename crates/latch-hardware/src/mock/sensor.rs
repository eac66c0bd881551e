//! Mock door switch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::sensor::DoorSensor;
use crate::{HardwareError, Result};

/// Door switch controlled through a [`MockSensorHandle`].
#[derive(Debug)]
pub struct MockSensor {
    open: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl MockSensor {
    /// Create a closed door switch and its handle.
    pub fn new() -> (Self, MockSensorHandle) {
        let open = Arc::new(AtomicBool::new(false));
        let failing = Arc::new(AtomicBool::new(false));
        let handle = MockSensorHandle {
            open: Arc::clone(&open),
            failing: Arc::clone(&failing),
        };
        (Self { open, failing }, handle)
    }
}

impl DoorSensor for MockSensor {
    fn is_open(&mut self) -> Result<bool> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HardwareError::read("mock door switch", "GPIO unavailable"));
        }
        Ok(self.open.load(Ordering::SeqCst))
    }
}

/// Control handle for a [`MockSensor`].
#[derive(Debug, Clone)]
pub struct MockSensorHandle {
    open: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl MockSensorHandle {
    /// Open or close the door.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Make sampling fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sensor_follows_handle() {
        let (mut sensor, handle) = MockSensor::new();
        assert!(!sensor.is_open().unwrap());
        handle.set_open(true);
        assert!(sensor.is_open().unwrap());
        handle.set_failing(true);
        assert!(sensor.is_open().is_err());
    }
}
