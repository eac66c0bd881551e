//! Error types for hardware operations.
//!
//! Transport failures (`PortOpenFailure`, `WriteTimeout`, `ReadError`,
//! `WriteError`, `Disconnected`, `Io`) are recovered inside the drivers by
//! closing the link and retrying. Only the unlock rejections
//! (`InvalidDuration`, `AlreadyUnlocked`) and transport failures during an
//! unlock attempt ever reach the orchestrator.

use std::time::Duration;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Discovery did not find the device.
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    /// The device path could not be opened.
    #[error("Failed to open {device}: {message}")]
    PortOpenFailure { device: String, message: String },

    /// The device accepted no data within the write timeout.
    #[error("Write timeout on {device}")]
    WriteTimeout { device: String },

    /// Reading from the device failed.
    #[error("Read error on {device}: {message}")]
    ReadError { device: String, message: String },

    /// Writing to the device failed.
    #[error("Write error on {device}: {message}")]
    WriteError { device: String, message: String },

    /// The link was used while closed.
    #[error("Link not open: {device}")]
    NotOpen { device: String },

    /// A malformed line or frame was received.
    #[error("Protocol error: {0}")]
    ProtocolParse(#[from] latch_protocol::ProtocolError),

    /// Unlock duration outside `(0, 30)` seconds.
    #[error("Invalid unlock duration: {duration:?}")]
    InvalidDuration { duration: Duration },

    /// An unlock session is already in progress.
    #[error("Door already unlocked")]
    AlreadyUnlocked,

    /// The driver task is gone or its device went away.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new device-not-found error.
    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device: device.into(),
        }
    }

    /// Create a new port open failure.
    pub fn port_open(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PortOpenFailure {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a new write timeout error.
    pub fn write_timeout(device: impl Into<String>) -> Self {
        Self::WriteTimeout {
            device: device.into(),
        }
    }

    /// Create a new read error.
    pub fn read(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadError {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a new write error.
    pub fn write(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteError {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a new not-open error.
    pub fn not_open(device: impl Into<String>) -> Self {
        Self::NotOpen {
            device: device.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Check whether this is a link failure that should close the link.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. }
                | Self::PortOpenFailure { .. }
                | Self::WriteTimeout { .. }
                | Self::ReadError { .. }
                | Self::WriteError { .. }
                | Self::NotOpen { .. }
                | Self::Disconnected { .. }
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_open_error() {
        let error = HardwareError::port_open("/dev/ttyUSB2", "No such file or directory");
        assert!(matches!(error, HardwareError::PortOpenFailure { .. }));
        assert_eq!(
            error.to_string(),
            "Failed to open /dev/ttyUSB2: No such file or directory"
        );
    }

    #[test]
    fn test_invalid_duration_error() {
        let error = HardwareError::InvalidDuration {
            duration: Duration::from_secs(30),
        };
        assert_eq!(error.to_string(), "Invalid unlock duration: 30s");
    }

    #[test]
    fn test_is_transport() {
        assert!(HardwareError::write("lock", "broken pipe").is_transport());
        assert!(HardwareError::not_open("reader").is_transport());
        assert!(HardwareError::device_not_found("modem").is_transport());
        assert!(!HardwareError::AlreadyUnlocked.is_transport());
        assert!(
            !HardwareError::InvalidDuration {
                duration: Duration::ZERO
            }
            .is_transport()
        );
        let parse = latch_protocol::ProtocolError::malformed("modem line", "x");
        assert!(!HardwareError::from(parse).is_transport());
    }
}
