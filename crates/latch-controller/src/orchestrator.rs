//! Access decisions and presence tracking.
//!
//! The orchestrator consumes the hardware event stream and decides what to
//! do with rings, tags, button presses and door movements. It runs as one
//! task; every handler completes before the next event is looked at, so a
//! slow roster lookup delays later events but never interleaves with them.
//!
//! ```text
//! RingStart(n) ──► roster ──► policy ──► lock.unlock() ──► show_unlocked
//!      │                         └──► denied: publish + show_membership_not_active
//!      └──► hang up after a short delay
//!
//! OpenChanged / light ──► PresenceTracker ──(leave delay)──► publish presence
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use latch_core::constants::NOTICE_SPEECH_DELAY;
use latch_core::{AccessMethod, Member, Settings};
use latch_hardware::{
    DoorEvent, EventReceiver, FeedbackPlayer, HardwareEvent, LockHandle, ModemEvent, ModemHandle,
    TerminalEvent,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::policy::{AccessDecision, AccessPolicy};
use crate::ports::{
    Notifier, Roster, Sound, Speaker, TOPIC_DOOR_OPEN, TOPIC_DOORBELL, TOPIC_HIDDEN_NUMBER,
    TOPIC_MEMBER_NOT_ACTIVE, TOPIC_NUMBER_NOT_IN_DATABASE, TOPIC_PRESENCE, TOPIC_UNKNOWN_TAG,
    TOPIC_UNLOCKED,
};
use crate::presence::{Presence, PresenceTracker};

const MESSAGE_HIDDEN_NUMBER: &str = "🔔 Someone rang the door from a hidden number.";
const MESSAGE_UNKNOWN_NUMBER: &str = "🔔 Someone rang the door from a number not in the roster.";
const MESSAGE_MANUAL_OPEN: &str = "🗝 The door was opened manually.";
const MESSAGE_LIGHTS_ON: &str = "💡 The lights came on.";
const MESSAGE_SPACE_EMPTY: &str = "💤 The space is empty.";

/// Orchestrator timing and policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// How long the lock stays open for a member.
    pub unlock_duration: Duration,

    /// Minimum time the door must have been open for closing it to relock.
    pub relock_debounce: Duration,

    /// Delay between a ring decision and hanging up.
    pub hangup_delay: Duration,

    /// Post-open notices older than this are dropped.
    pub notice_window: Duration,

    pub leave_delay: Duration,
    pub renotify_interval: Duration,
    pub policy: AccessPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            unlock_duration: settings.door.unlock_duration(),
            relock_debounce: settings.door.relock_debounce(),
            hangup_delay: settings.ring.hangup_delay(),
            notice_window: settings.ring.notice_window(),
            leave_delay: settings.presence.leave_delay(),
            renotify_interval: settings.presence.renotify_interval(),
            policy: AccessPolicy::from(&settings.membership),
        }
    }
}

/// Driver handles the orchestrator acts through.
#[derive(Debug, Clone)]
pub struct Devices {
    pub lock: LockHandle,
    pub modem: ModemHandle,
    pub feedback: FeedbackPlayer,
}

#[derive(Debug)]
enum Input {
    LightOn(bool),
}

/// Feeds inputs that do not come from the drivers.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    inputs: mpsc::UnboundedSender<Input>,
}

impl OrchestratorHandle {
    /// Report the light status of the space.
    pub fn light_on_change(&self, on: bool) {
        let _ = self.inputs.send(Input::LightOn(on));
    }
}

/// A message to speak when the door next opens.
#[derive(Debug)]
struct PendingNotice {
    text: String,
    scheduled_at: Instant,
}

/// The door controller state machine.
pub struct Orchestrator<R> {
    config: OrchestratorConfig,
    roster: R,
    notifier: Arc<dyn Notifier>,
    speaker: Arc<dyn Speaker>,
    lock: LockHandle,
    modem: ModemHandle,
    feedback: FeedbackPlayer,
    inputs: mpsc::UnboundedReceiver<Input>,

    door_open: bool,
    light_on: bool,
    opened_at: Option<Instant>,
    last_unlocked_by: Option<Member>,
    notice: Option<PendingNotice>,
    presence: PresenceTracker,
    notified_members: HashMap<u32, Instant>,
    hangup_at: Option<Instant>,
}

impl<R: Roster> Orchestrator<R> {
    pub fn new(
        config: OrchestratorConfig,
        devices: Devices,
        roster: R,
        notifier: Arc<dyn Notifier>,
        speaker: Arc<dyn Speaker>,
    ) -> (Self, OrchestratorHandle) {
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let presence = PresenceTracker::new(config.leave_delay);

        let orchestrator = Self {
            config,
            roster,
            notifier,
            speaker,
            lock: devices.lock,
            modem: devices.modem,
            feedback: devices.feedback,
            inputs,
            door_open: false,
            light_on: false,
            opened_at: None,
            last_unlocked_by: None,
            notice: None,
            presence,
            notified_members: HashMap::new(),
            hangup_at: None,
        };
        (orchestrator, OrchestratorHandle { inputs: inputs_tx })
    }

    /// Committed presence.
    pub fn presence(&self) -> Presence {
        self.presence.current()
    }

    /// Process events until the hardware event stream ends.
    pub async fn run(mut self, mut events: EventReceiver) {
        let mut inputs_open = true;

        loop {
            let presence_deadline = self.presence.deadline();
            let hangup_at = self.hangup_at;

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                input = self.inputs.recv(), if inputs_open => match input {
                    Some(Input::LightOn(on)) => self.light_on_change(on),
                    None => inputs_open = false,
                },
                _ = sleep_until(presence_deadline), if presence_deadline.is_some() => {
                    self.commit_presence();
                }
                _ = sleep_until(hangup_at), if hangup_at.is_some() => {
                    self.hangup_at = None;
                    debug!("Hanging up");
                    self.modem.hangup();
                }
            }
        }

        info!("Hardware event stream ended");
        self.feedback.stop();
    }

    /// Dispatch one hardware event.
    pub async fn handle_event(&mut self, event: HardwareEvent) {
        match event {
            HardwareEvent::Door(DoorEvent::OpenChanged(is_open)) => self.door_open_change(is_open),
            HardwareEvent::Door(DoorEvent::UnlockedChanged(is_unlocked)) => {
                self.door_unlocked_change(is_unlocked)
            }
            HardwareEvent::Modem(ModemEvent::RingStart(number)) => {
                self.on_ring_start(number.as_deref()).await
            }
            HardwareEvent::Modem(ModemEvent::RingEnd) => {
                info!(target: "audit", "Incoming call ended");
            }
            HardwareEvent::Modem(ModemEvent::SignalStrength(rssi)) => {
                debug!(rssi, "Modem signal strength");
            }
            HardwareEvent::Terminal(TerminalEvent::TagRead(tag_id)) => {
                self.on_tag_read(&tag_id).await
            }
            HardwareEvent::Terminal(TerminalEvent::Button(pressed)) => {
                self.doorbell_button_change(pressed)
            }
            other => debug!(event = ?other, "Ignoring hardware event"),
        }
    }

    /// Incoming call, with the caller id unless withheld.
    pub async fn on_ring_start(&mut self, number: Option<&str>) {
        info!(target: "audit", number = ?number, "Incoming call");

        let Some(number) = number else {
            self.notifier.publish(TOPIC_HIDDEN_NUMBER, None, false);
            self.unknown_caller("Hidden number", MESSAGE_HIDDEN_NUMBER);
            return;
        };

        let Some(member) = self.roster.lookup_by_phone(number).await else {
            info!(target: "audit", number, "Number not in roster");
            self.notifier.publish(TOPIC_NUMBER_NOT_IN_DATABASE, None, false);
            self.unknown_caller("Unknown number", MESSAGE_UNKNOWN_NUMBER);
            return;
        };

        self.maybe_unlock_for_member(member, AccessMethod::Phone).await;
        self.hangup_at = Some(Instant::now() + self.config.hangup_delay);
    }

    fn unknown_caller(&self, screen_text: &str, message: &str) {
        self.feedback.show_unknown(screen_text, false);
        self.speaker.play(Sound::Doorbell);
        self.notifier.message(message);
    }

    /// A new tag presentation.
    pub async fn on_tag_read(&mut self, tag_id: &str) {
        if tag_id.is_empty() {
            return;
        }
        info!(target: "audit", tag_id, "Tag read");

        let Some(member) = self.roster.lookup_by_tag(tag_id).await else {
            info!(target: "audit", tag_id, "Tag not in roster");
            self.notifier.publish(TOPIC_UNKNOWN_TAG, None, false);
            if !self.lock.state().is_unlocked {
                self.feedback.show_unknown("Unknown tag", true);
            }
            return;
        };

        self.maybe_unlock_for_member(member, AccessMethod::Tag).await;
    }

    /// Apply the membership policy and unlock if it allows.
    pub async fn maybe_unlock_for_member(&mut self, member: Member, method: AccessMethod) {
        let days_left = member.days_until_expiration(Utc::now());
        let decision = self.config.policy.decide(days_left);
        info!(
            target: "audit",
            member = %member.display_name(),
            %method,
            days_left,
            ?decision,
            "Membership checked"
        );

        if decision == AccessDecision::Denied {
            info!(target: "audit", member = %member.display_name(), "Not an active member");
            self.notifier
                .publish(TOPIC_MEMBER_NOT_ACTIVE, Some(member.public_name()), false);
            self.feedback.show_membership_not_active(&member);
            return;
        }

        let session = match self.lock.unlock(self.config.unlock_duration).await {
            Ok(session) => session,
            Err(e) => {
                warn!(target: "audit", member = %member.display_name(), error = %e, "Door not opened");
                return;
            }
        };
        info!(
            target: "audit",
            member = %member.display_name(),
            session = session.id,
            "Opening door"
        );

        if let Some(text) = decision.notice() {
            debug!(text = %text, "Notice scheduled for next open");
            self.notice = Some(PendingNotice {
                text,
                scheduled_at: Instant::now(),
            });
        }

        self.notifier
            .publish(TOPIC_UNLOCKED, Some(member.public_name()), false);

        let now = Instant::now();
        let renotify = self
            .notified_members
            .get(&member.id)
            .is_none_or(|at| now.saturating_duration_since(*at) >= self.config.renotify_interval);
        if renotify {
            self.notified_members.insert(member.id, now);
            self.notifier
                .message(&format!("🚪 {} opened the door.", member.public_name()));
        }

        self.speaker.play(Sound::Bleep);
        self.feedback
            .show_unlocked(&member, session.expires_at, method, decision.is_expired());
        self.last_unlocked_by = Some(member);
    }

    /// Door switch edge.
    pub fn door_open_change(&mut self, is_open: bool) {
        self.door_open = is_open;
        let now = Instant::now();

        if is_open {
            self.opened_at = Some(now);

            if self.lock.state().is_unlocked {
                let by = self
                    .last_unlocked_by
                    .as_ref()
                    .map_or_else(|| "unknown".to_string(), Member::display_name);
                info!(target: "audit", by = %by, "Door opened while unlocked");
            } else {
                info!(target: "audit", "Door opened manually");
                if !self.presence.is_present() {
                    self.notifier.message(MESSAGE_MANUAL_OPEN);
                }
            }

            if let Some(notice) = self.notice.take() {
                if now.saturating_duration_since(notice.scheduled_at) < self.config.notice_window {
                    info!(target: "audit", text = %notice.text, "Delivering notice");
                    self.speaker.say(&notice.text, NOTICE_SPEECH_DELAY);
                } else {
                    debug!(text = %notice.text, "Dropping stale notice");
                }
            }
        } else {
            info!(target: "audit", "Door closed");

            let open_long_enough = self
                .opened_at
                .is_some_and(|at| now.saturating_duration_since(at) >= self.config.relock_debounce);
            if self.lock.state().is_unlocked && open_long_enough {
                info!(target: "audit", "Relocking after door closed");
                self.lock.lock();
            }
        }

        self.notifier
            .publish(TOPIC_DOOR_OPEN, Some(if is_open { "1" } else { "0" }), true);
        self.update_presence();
    }

    /// Lock relay edge.
    pub fn door_unlocked_change(&mut self, is_unlocked: bool) {
        if is_unlocked {
            info!(target: "audit", "Door unlocked");
        } else {
            info!(target: "audit", "Door locked");
            self.feedback.show_locked();
        }
    }

    /// Doorbell button edge.
    pub fn doorbell_button_change(&mut self, pressed: bool) {
        if !pressed || self.lock.state().is_unlocked {
            return;
        }
        info!(target: "audit", "Doorbell pressed");
        self.feedback.show_doorbell();
        self.speaker.play(Sound::Doorbell);
        self.notifier.publish(TOPIC_DOORBELL, None, false);
    }

    /// Light status of the space.
    pub fn light_on_change(&mut self, on: bool) {
        debug!(on, "Light status");
        self.light_on = on;
        if on && !self.presence.is_present() {
            self.notifier.message(MESSAGE_LIGHTS_ON);
        }
        self.update_presence();
    }

    fn update_presence(&mut self) {
        self.presence
            .observe(self.light_on || self.door_open, Instant::now());
    }

    fn commit_presence(&mut self) {
        let Some(presence) = self.presence.commit_due(Instant::now()) else {
            return;
        };

        info!(target: "audit", %presence, "Presence changed");
        let present = presence == Presence::Present;
        self.notifier
            .publish(TOPIC_PRESENCE, Some(if present { "1" } else { "0" }), true);
        if !present {
            self.notified_members.clear();
            self.notifier.message(MESSAGE_SPACE_EMPTY);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = Settings::from_toml_str(
            r#"
            [door]
            phone_open_time_secs = 7

            [membership]
            grace_period_days = 14
            day_zero_is_expired = true

            [ring]
            notice_window_secs = 45
            "#,
        )
        .unwrap();

        let config = OrchestratorConfig::from(&settings);
        assert_eq!(config.unlock_duration, Duration::from_secs(7));
        assert_eq!(config.notice_window, Duration::from_secs(45));
        assert_eq!(config.policy.grace_period_days, 14);
        assert!(config.policy.day_zero_is_expired);
        assert_eq!(config.leave_delay, settings.presence.leave_delay());
    }
}
