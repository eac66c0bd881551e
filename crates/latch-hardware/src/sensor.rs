//! Door switch sampling.

use std::path::PathBuf;

use crate::{HardwareError, Result};

/// A door switch that can be sampled on demand.
pub trait DoorSensor: Send + 'static {
    /// Sample the switch; `true` when the door is open.
    fn is_open(&mut self) -> Result<bool>;
}

impl<S: DoorSensor + ?Sized> DoorSensor for Box<S> {
    fn is_open(&mut self) -> Result<bool> {
        (**self).is_open()
    }
}

/// Door switch exposed through the sysfs GPIO interface.
///
/// Reads the pin's `value` file, which contains `0` or `1`. The pin must be
/// exported and configured as an input (with pull-up) before startup.
///
/// The read is a plain synchronous one: sysfs attributes are served by the
/// kernel from memory and never wait on a device.
#[derive(Debug, Clone)]
pub struct SysfsGpioSensor {
    value_path: PathBuf,
    open_level: bool,
}

impl SysfsGpioSensor {
    /// Sample `value_path`; the door is open when the pin reads `open_level`.
    pub fn new(value_path: impl Into<PathBuf>, open_level: bool) -> Self {
        Self {
            value_path: value_path.into(),
            open_level,
        }
    }
}

impl DoorSensor for SysfsGpioSensor {
    fn is_open(&mut self) -> Result<bool> {
        let raw = std::fs::read_to_string(&self.value_path)?;
        let level = match raw.trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(HardwareError::read(
                    self.value_path.display().to_string(),
                    format!("unexpected GPIO value {other:?}"),
                ));
            }
        };
        Ok(level == self.open_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn value_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[rstest]
    #[case("1\n", true, true)]
    #[case("0\n", true, false)]
    #[case("1", false, false)]
    #[case("0", false, true)]
    fn test_sysfs_levels(#[case] contents: &str, #[case] open_level: bool, #[case] open: bool) {
        let file = value_file(contents);
        let mut sensor = SysfsGpioSensor::new(file.path(), open_level);
        assert_eq!(sensor.is_open().unwrap(), open);
    }

    #[test]
    fn test_sysfs_garbage_is_error() {
        let file = value_file("x");
        let mut sensor = SysfsGpioSensor::new(file.path(), true);
        assert!(matches!(
            sensor.is_open(),
            Err(HardwareError::ReadError { .. })
        ));
    }

    #[test]
    fn test_sysfs_missing_file_is_io_error() {
        let mut sensor = SysfsGpioSensor::new("/sys/class/gpio/latch-missing/value", true);
        assert!(matches!(sensor.is_open(), Err(HardwareError::Io(_))));
    }
}
