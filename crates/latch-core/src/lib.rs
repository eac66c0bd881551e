//! Core types shared by every `latch` crate.
//!
//! This crate holds the domain model (members, door state, access methods),
//! the process configuration model and the timing constants the hardware
//! drivers and the orchestrator agree on.

pub mod constants;
pub mod error;
pub mod settings;
pub mod types;

pub use error::{Error, Result};
pub use settings::Settings;
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
