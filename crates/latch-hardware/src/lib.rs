//! Hardware drivers for the `latch` door controller.
//!
//! Three devices hang off serial lines:
//!
//! - the **lock relay**, energized while a serial line clocks out filler
//!   bytes ([`lock`]), together with the door switch ([`sensor`]),
//! - a **cellular modem** reporting incoming calls ([`modem`]),
//! - an **RFID reader terminal** with display, buzzer, LED and doorbell
//!   button ([`terminal`], [`feedback`]).
//!
//! Each driver is an actor: `Driver::new(..)` returns the driver and a
//! cloneable handle, and `driver.run()` is spawned as its own task (see
//! [`manager`]). Drivers own their [`SerialLink`] exclusively, recover from
//! transport failures on their own and report what happened as
//! [`HardwareEvent`]s on one shared channel.
//!
//! # Testing without hardware
//!
//! Every device seam has an in-memory double in [`mock`]: [`MemoryLink`]
//! stands in for a serial port, [`MockSensor`] for the door switch,
//! [`MockDiscovery`] for USB enumeration and [`MockTerminal`] emulates the
//! terminal firmware. The drivers run unchanged on top of them.
//!
//! ```
//! use std::time::Duration;
//! use latch_hardware::events::event_channel;
//! use latch_hardware::lock::{LockActuator, LockConfig};
//! use latch_hardware::mock::{MemoryLink, MockSensor};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> latch_hardware::Result<()> {
//! let (events, _rx) = event_channel();
//! let (link, relay) = MemoryLink::new("lock");
//! let (sensor, _switch) = MockSensor::new();
//! let (actuator, lock) = LockActuator::new(link, sensor, LockConfig::default(), events);
//! tokio::spawn(actuator.run());
//!
//! let session = lock.unlock(Duration::from_secs(2)).await?;
//! assert_eq!(session.bytes, 1920);
//! assert_eq!(relay.written().len(), 1920);
//! # Ok(())
//! # }
//! ```
//!
//! [`MemoryLink`]: mock::MemoryLink
//! [`MockSensor`]: mock::MockSensor
//! [`MockDiscovery`]: mock::MockDiscovery
//! [`MockTerminal`]: mock::MockTerminal

pub mod discovery;
pub mod error;
pub mod events;
pub mod feedback;
pub mod link;
pub mod lock;
pub mod log_once;
pub mod manager;
pub mod mock;
pub mod modem;
pub mod sensor;
pub mod terminal;

pub use discovery::{DeviceDiscovery, DeviceStatus, SysfsUsbDiscovery};
pub use error::{HardwareError, Result};
pub use events::{DoorEvent, EventReceiver, EventSender, HardwareEvent, ModemEvent, TerminalEvent};
pub use feedback::FeedbackPlayer;
pub use link::{SerialLink, SerialPortConfig, SerialPortLink};
pub use lock::{LockActuator, LockConfig, LockHandle, UnlockSession};
pub use manager::{DriverKind, DriverManager, DriverTasks};
pub use modem::{ModemConfig, ModemController, ModemHandle, RingState};
pub use sensor::{DoorSensor, SysfsGpioSensor};
pub use terminal::{TerminalConfig, TerminalHandle, TerminalLink, TerminalSink};
