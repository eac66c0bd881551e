//! In-memory device implementations for testing and simulation.
//!
//! Each mock comes with a cloneable handle that injects input and inspects
//! output from outside the driver task, mirroring the real device's
//! behavior closely enough that drivers cannot tell them apart.

pub mod discovery;
pub mod link;
pub mod sensor;
pub mod terminal;

pub use discovery::{MockDiscovery, MockDiscoveryHandle};
pub use link::{MemoryLink, MemoryLinkHandle};
pub use sensor::{MockSensor, MockSensorHandle};
pub use terminal::{MockTerminal, MockTerminalHandle};
