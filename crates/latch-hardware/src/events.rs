//! Events raised by the drivers.
//!
//! Every driver task sends into one shared channel, so the orchestrator
//! consumes a single ordered stream per driver. A dropped receiver is not an
//! error: the event is discarded and the driver keeps running.

use tokio::sync::mpsc;
use tracing::trace;

/// Sending half of the shared hardware event channel.
pub type EventSender = mpsc::UnboundedSender<HardwareEvent>;

/// Receiving half of the shared hardware event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<HardwareEvent>;

/// Create the shared hardware event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Unified event from any driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HardwareEvent {
    /// Lock actuator and door switch.
    Door(DoorEvent),

    /// Cellular modem.
    Modem(ModemEvent),

    /// RFID reader terminal.
    Terminal(TerminalEvent),
}

/// Edge-triggered door state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorEvent {
    /// Door switch changed; `true` when open.
    OpenChanged(bool),

    /// Lock relay changed; `true` when unlocked.
    UnlockedChanged(bool),
}

/// Modem events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    /// Received signal strength report.
    SignalStrength(i32),

    /// A new incoming call, with the caller number unless withheld.
    RingStart(Option<String>),

    /// The incoming call ended or was abandoned.
    RingEnd,
}

/// Terminal input events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// A tag was presented; lowercase hex uid.
    TagRead(String),

    /// Doorbell button changed; `true` when pressed.
    Button(bool),
}

impl From<DoorEvent> for HardwareEvent {
    fn from(event: DoorEvent) -> Self {
        HardwareEvent::Door(event)
    }
}

impl From<ModemEvent> for HardwareEvent {
    fn from(event: ModemEvent) -> Self {
        HardwareEvent::Modem(event)
    }
}

impl From<TerminalEvent> for HardwareEvent {
    fn from(event: TerminalEvent) -> Self {
        HardwareEvent::Terminal(event)
    }
}

/// Send an event, tolerating a missing subscriber.
pub(crate) fn emit(events: &EventSender, event: impl Into<HardwareEvent>) {
    if let Err(dropped) = events.send(event.into()) {
        trace!(event = ?dropped.0, "No subscriber for hardware event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_delivers_in_order() {
        let (tx, mut rx) = event_channel();
        emit(&tx, DoorEvent::OpenChanged(true));
        emit(&tx, ModemEvent::RingEnd);

        assert_eq!(
            rx.recv().await,
            Some(HardwareEvent::Door(DoorEvent::OpenChanged(true)))
        );
        assert_eq!(rx.recv().await, Some(HardwareEvent::Modem(ModemEvent::RingEnd)));
    }

    #[test]
    fn test_emit_without_receiver_is_silent() {
        let (tx, rx) = event_channel();
        drop(rx);
        emit(&tx, TerminalEvent::Button(true));
    }
}
