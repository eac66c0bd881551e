//! Modem device discovery and USB mode switching.
//!
//! Some USB modems first enumerate as a mass-storage device and only expose
//! their serial interfaces after a vendor-specific mode switch. Discovery
//! tells the modem driver which case it is in so it can trigger the switch
//! and retry on the next poll.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{HardwareError, Result};

/// Default sysfs directory listing USB devices.
pub const USB_DEVICES_ROOT: &str = "/sys/bus/usb/devices";

/// Outcome of a discovery scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The control TTY exists.
    Present,

    /// The modem is attached in its storage mode and needs a mode switch.
    WrongMode,

    /// Nothing recognizable is attached.
    Absent,
}

/// Finds the modem among attached devices.
pub trait DeviceDiscovery: Send + 'static {
    /// Scan attached devices.
    fn probe(&mut self) -> DeviceStatus;

    /// Trigger a USB mode switch. Must not wait for it to complete.
    fn mode_switch(&mut self) -> Result<()>;
}

impl<D: DeviceDiscovery + ?Sized> DeviceDiscovery for Box<D> {
    fn probe(&mut self) -> DeviceStatus {
        (**self).probe()
    }

    fn mode_switch(&mut self) -> Result<()> {
        (**self).mode_switch()
    }
}

/// Discovery through the device node and sysfs USB attributes.
#[derive(Debug, Clone)]
pub struct SysfsUsbDiscovery {
    serial_path: PathBuf,
    mode_switch_usb_id: Option<String>,
    mode_switch_command: Option<String>,
    usb_root: PathBuf,
}

impl SysfsUsbDiscovery {
    /// Create discovery for the TTY at `serial_path`.
    ///
    /// `mode_switch_usb_id` is the `vendor:product` pair (lowercase hex) the
    /// modem reports in storage mode; `mode_switch_command` is run through
    /// `sh -c` when it is seen.
    pub fn new(
        serial_path: impl Into<PathBuf>,
        mode_switch_usb_id: Option<String>,
        mode_switch_command: Option<String>,
    ) -> Self {
        Self {
            serial_path: serial_path.into(),
            mode_switch_usb_id: mode_switch_usb_id.map(|id| id.to_lowercase()),
            mode_switch_command,
            usb_root: PathBuf::from(USB_DEVICES_ROOT),
        }
    }

    /// Scan a different sysfs root.
    pub fn with_usb_root(mut self, usb_root: impl Into<PathBuf>) -> Self {
        self.usb_root = usb_root.into();
        self
    }

    fn attached_usb_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.usb_root) else {
            return Vec::new();
        };

        entries
            .flatten()
            .filter_map(|entry| usb_id(&entry.path()))
            .collect()
    }
}

fn usb_id(device: &Path) -> Option<String> {
    let vendor = std::fs::read_to_string(device.join("idVendor")).ok()?;
    let product = std::fs::read_to_string(device.join("idProduct")).ok()?;
    Some(format!("{}:{}", vendor.trim(), product.trim()).to_lowercase())
}

impl DeviceDiscovery for SysfsUsbDiscovery {
    fn probe(&mut self) -> DeviceStatus {
        if self.serial_path.exists() {
            return DeviceStatus::Present;
        }

        match &self.mode_switch_usb_id {
            Some(wanted) if self.attached_usb_ids().iter().any(|id| id == wanted) => {
                DeviceStatus::WrongMode
            }
            _ => DeviceStatus::Absent,
        }
    }

    fn mode_switch(&mut self) -> Result<()> {
        let Some(command) = self.mode_switch_command.clone() else {
            return Err(HardwareError::device_not_found(format!(
                "{} (no mode switch command configured)",
                self.serial_path.display()
            )));
        };

        info!(command = %command, "Attempting USB mode switch");
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .spawn()?;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!("USB mode switch finished"),
                Ok(status) => warn!(%status, "USB mode switch command failed"),
                Err(e) => warn!(error = %e, "USB mode switch command could not be awaited"),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_usb_device(root: &Path, name: &str, vendor: &str, product: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("idVendor"), format!("{vendor}\n")).unwrap();
        std::fs::write(dir.join("idProduct"), format!("{product}\n")).unwrap();
    }

    #[test]
    fn test_present_when_tty_exists() {
        let tty = tempfile::NamedTempFile::new().unwrap();
        let mut discovery = SysfsUsbDiscovery::new(tty.path(), None, None);
        assert_eq!(discovery.probe(), DeviceStatus::Present);
    }

    #[test]
    fn test_wrong_mode_when_storage_id_attached() {
        let root = tempfile::tempdir().unwrap();
        fake_usb_device(root.path(), "1-1", "1d6b", "0002");
        fake_usb_device(root.path(), "1-1.3", "12D1", "1F01");

        let mut discovery = SysfsUsbDiscovery::new(
            "/dev/latch-missing-modem",
            Some("12d1:1f01".to_string()),
            Some("true".to_string()),
        )
        .with_usb_root(root.path());
        assert_eq!(discovery.probe(), DeviceStatus::WrongMode);
    }

    #[test]
    fn test_absent_when_nothing_matches() {
        let root = tempfile::tempdir().unwrap();
        fake_usb_device(root.path(), "1-1", "1d6b", "0002");

        let mut discovery = SysfsUsbDiscovery::new(
            "/dev/latch-missing-modem",
            Some("12d1:1f01".to_string()),
            None,
        )
        .with_usb_root(root.path());
        assert_eq!(discovery.probe(), DeviceStatus::Absent);
    }

    #[test]
    fn test_mode_switch_without_command_fails() {
        let mut discovery = SysfsUsbDiscovery::new("/dev/latch-missing-modem", None, None);
        assert!(matches!(
            discovery.mode_switch(),
            Err(HardwareError::DeviceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_mode_switch_spawns_command() {
        let mut discovery =
            SysfsUsbDiscovery::new("/dev/latch-missing-modem", None, Some("true".to_string()));
        assert!(discovery.mode_switch().is_ok());
    }
}
