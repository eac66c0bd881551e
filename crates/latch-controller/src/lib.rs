//! Door controller logic for `latch`.
//!
//! [`Orchestrator`] turns hardware events into access decisions: it looks
//! callers and tags up in a [`Roster`], applies the [`AccessPolicy`], drives
//! the lock and the terminal feedback, and tracks whether anyone is in the
//! space. Outward effects go through the [`Notifier`] and [`Speaker`] ports.
//!
//! Decisions are logged at `info` under the `audit` target.

pub mod orchestrator;
pub mod policy;
pub mod ports;
pub mod presence;

pub use orchestrator::{Devices, Orchestrator, OrchestratorConfig, OrchestratorHandle};
pub use policy::{AccessDecision, AccessPolicy};
pub use ports::{LogNotifier, LogSpeaker, Notifier, Roster, Sound, Speaker};
pub use presence::{Presence, PresenceTracker};
