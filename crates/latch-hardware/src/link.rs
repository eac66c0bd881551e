//! Non-blocking serial byte-stream endpoints.
//!
//! Every driver owns exactly one [`SerialLink`]. Links never retry on their
//! own: open failures and I/O errors are reported to the owning driver,
//! which applies its own reconnect policy (fixed path, USB enumeration or
//! USB mode-switch).

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, FlowControl, SerialPort};
use tracing::debug;

use crate::{HardwareError, Result};

/// A non-blocking, explicitly reopened byte-stream endpoint.
///
/// # Contract
///
/// - `read` returns the number of bytes copied into `buf`, `0` when nothing
///   is available. It never waits.
/// - `write` returns how many bytes the device accepted, possibly fewer
///   than offered. Callers track partial writes.
/// - `write` hands bytes to the device's transmit buffer; they reach the
///   wire later. `pending_output` reports how many are still queued and
///   `discard_output` drops them.
/// - Any I/O failure closes the link before the error is returned.
/// - `close` is idempotent.
pub trait SerialLink: Send + 'static {
    /// Device name used in logs and errors.
    fn name(&self) -> &str;

    /// Acquire the device. Succeeds immediately when already open.
    fn open(&mut self) -> Result<()>;

    /// Check whether the device is currently held.
    fn is_open(&self) -> bool;

    /// Read whatever is available without waiting.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Offer `data` to the device without waiting.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Bytes accepted by `write` that have not been transmitted yet.
    fn pending_output(&mut self) -> Result<u64>;

    /// Drop accepted bytes that have not been transmitted yet.
    fn discard_output(&mut self) -> Result<()>;

    /// Release the device.
    fn close(&mut self);
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn pending_output(&mut self) -> Result<u64> {
        (**self).pending_output()
    }

    fn discard_output(&mut self) -> Result<()> {
        (**self).discard_output()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Settings for a [`SerialPortLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortConfig {
    /// Device path, e.g. `/dev/ttyUSB2`.
    pub path: String,

    /// Line speed.
    pub baud_rate: u32,

    /// Use RTS/CTS hardware flow control.
    pub hardware_flow_control: bool,

    /// Assert DTR after opening.
    pub assert_dtr: bool,
}

impl SerialPortConfig {
    /// Plain 8N1 line without flow control.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            hardware_flow_control: false,
            assert_dtr: false,
        }
    }

    /// Line with RTS/CTS flow control and DTR asserted, as modems expect.
    pub fn with_modem_control(mut self) -> Self {
        self.hardware_flow_control = true;
        self.assert_dtr = true;
        self
    }
}

/// [`SerialLink`] backed by a real TTY through the `serialport` crate.
///
/// The port is opened with a zero timeout so reads and writes return
/// immediately; a timeout from the OS is reported as zero bytes moved.
pub struct SerialPortLink {
    config: SerialPortConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortLink {
    /// Create a closed link.
    pub fn new(config: SerialPortConfig) -> Self {
        Self { config, port: None }
    }

    fn fail(&mut self, error: HardwareError) -> HardwareError {
        self.close();
        error
    }
}

impl std::fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("config", &self.config)
            .field("open", &self.port.is_some())
            .finish()
    }
}

fn would_block(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl SerialLink for SerialPortLink {
    fn name(&self) -> &str {
        &self.config.path
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let flow_control = if self.config.hardware_flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };

        let mut port = serialport::new(&self.config.path, self.config.baud_rate)
            .flow_control(flow_control)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| HardwareError::port_open(&self.config.path, e.to_string()))?;

        if self.config.assert_dtr {
            port.write_data_terminal_ready(true)
                .map_err(|e| HardwareError::port_open(&self.config.path, e.to_string()))?;
        }

        debug!(path = %self.config.path, baud = self.config.baud_rate, "Serial port opened");
        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(HardwareError::not_open(&self.config.path));
        };

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => {
                let error = HardwareError::read(&self.config.path, e.to_string());
                Err(self.fail(error))
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(HardwareError::not_open(&self.config.path));
        };

        match port.write(data) {
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => {
                let error = HardwareError::write(&self.config.path, e.to_string());
                Err(self.fail(error))
            }
        }
    }

    fn pending_output(&mut self) -> Result<u64> {
        let Some(port) = self.port.as_mut() else {
            return Err(HardwareError::not_open(&self.config.path));
        };

        match port.bytes_to_write() {
            Ok(n) => Ok(u64::from(n)),
            Err(e) => {
                let error = HardwareError::write(&self.config.path, e.to_string());
                Err(self.fail(error))
            }
        }
    }

    fn discard_output(&mut self) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(HardwareError::not_open(&self.config.path));
        };

        port.clear(ClearBuffer::Output).map_err(|e| {
            let error = HardwareError::write(&self.config.path, e.to_string());
            self.fail(error)
        })
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(path = %self.config.path, "Serial port closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modem_control_config() {
        let config = SerialPortConfig::new("/dev/ttyUSB2", 9600).with_modem_control();
        assert!(config.hardware_flow_control);
        assert!(config.assert_dtr);
    }

    #[test]
    fn test_open_missing_device_fails_and_stays_closed() {
        let mut link = SerialPortLink::new(SerialPortConfig::new("/dev/latch-does-not-exist", 9600));
        let result = link.open();
        assert!(matches!(result, Err(HardwareError::PortOpenFailure { .. })));
        assert!(!link.is_open());
    }

    #[test]
    fn test_io_on_closed_link_is_not_open() {
        let mut link = SerialPortLink::new(SerialPortConfig::new("/dev/null", 9600));
        let mut buf = [0u8; 8];
        assert!(matches!(
            link.read(&mut buf),
            Err(HardwareError::NotOpen { .. })
        ));
        assert!(matches!(link.write(b"AT"), Err(HardwareError::NotOpen { .. })));
        assert!(matches!(link.pending_output(), Err(HardwareError::NotOpen { .. })));
        assert!(matches!(link.discard_output(), Err(HardwareError::NotOpen { .. })));
        link.close();
        link.close();
    }
}
