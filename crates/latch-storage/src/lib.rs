//! Member roster storage for `latch`.
//!
//! The roster is a snapshot of the membership register kept in a JSON cache
//! file next to the controller. [`MemoryRoster`] loads it and answers the
//! orchestrator's lookups from memory.

pub mod error;
pub mod record;
pub mod roster;

pub use error::{StorageError, StorageResult};
pub use record::{MemberRecord, TagIds};
pub use roster::MemoryRoster;
