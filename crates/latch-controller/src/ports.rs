//! Collaborators the orchestrator talks to.
//!
//! The roster is awaited inside a decision. Notifications and audio are
//! fire-and-forget: implementations must not block and must swallow their
//! own delivery failures.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use latch_core::Member;
use tracing::info;

/// Topic published when a ring carries no caller id.
pub const TOPIC_HIDDEN_NUMBER: &str = "ring/hidden_number";
/// Topic published when the caller is not in the roster.
pub const TOPIC_NUMBER_NOT_IN_DATABASE: &str = "ring/number_not_in_database";
/// Topic published when an expired member is denied.
pub const TOPIC_MEMBER_NOT_ACTIVE: &str = "ring/member_not_active";
/// Topic published when the door is unlocked for a member.
pub const TOPIC_UNLOCKED: &str = "ring/unlocked";
/// Topic published when an unknown tag is presented.
pub const TOPIC_UNKNOWN_TAG: &str = "reader/unknown_tag";
/// Topic published when the doorbell button is pressed.
pub const TOPIC_DOORBELL: &str = "doorbell";
/// Retained door switch state, `"1"` when open.
pub const TOPIC_DOOR_OPEN: &str = "door_open";
/// Retained presence state, `"1"` when someone is in.
pub const TOPIC_PRESENCE: &str = "presence";

/// Member lookup.
///
/// Implementations may use `async fn`; the returned futures must be `Send`
/// so the orchestrator can run on a multi-threaded runtime. The trait is
/// not object-safe, the orchestrator is generic over it.
pub trait Roster: Send + Sync + 'static {
    /// Find the member owning `number` (international format).
    fn lookup_by_phone(&self, number: &str) -> impl Future<Output = Option<Member>> + Send;

    /// Find the member owning the normalized tag id.
    fn lookup_by_tag(&self, tag_id: &str) -> impl Future<Output = Option<Member>> + Send;
}

/// Outward notifications.
pub trait Notifier: Send + Sync + 'static {
    /// Publish a machine-readable event.
    fn publish(&self, topic: &str, payload: Option<&str>, retain: bool);

    /// Send a human-readable message to the members' channel.
    fn message(&self, text: &str);
}

/// Sounds the speaker can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sound {
    Doorbell,
    Bleep,
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doorbell => write!(f, "doorbell"),
            Self::Bleep => write!(f, "bleep"),
        }
    }
}

/// Audio output inside the space.
pub trait Speaker: Send + Sync + 'static {
    fn play(&self, sound: Sound);

    /// Speak `text` after `delay`.
    fn say(&self, text: &str, delay: Duration);
}

/// [`Notifier`] writing to the log, for deployments without a message bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, topic: &str, payload: Option<&str>, retain: bool) {
        info!(target: "notify", topic, payload, retain, "Publish");
    }

    fn message(&self, text: &str) {
        info!(target: "notify", text, "Message");
    }
}

/// [`Speaker`] writing to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSpeaker;

impl Speaker for LogSpeaker {
    fn play(&self, sound: Sound) {
        info!(target: "speaker", %sound, "Play");
    }

    fn say(&self, text: &str, delay: Duration) {
        info!(target: "speaker", text, delay_ms = delay.as_millis() as u64, "Say");
    }
}
