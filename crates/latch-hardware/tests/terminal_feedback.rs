//! Feedback sequences played through the real terminal link against the
//! emulated terminal firmware.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use latch_core::{AccessMethod, Member};
use latch_hardware::events::event_channel;
use latch_hardware::mock::{MemoryLink, MockTerminal, MockTerminalHandle};
use latch_hardware::{FeedbackPlayer, TerminalConfig, TerminalLink};
use latch_protocol::{Bitmap, CommandKind, ReaderCommand};
use tokio::time::Instant;

fn start() -> (FeedbackPlayer, MockTerminalHandle) {
    let (link, device) = MemoryLink::new("terminal");
    let (events, _rx) = event_channel();
    let (terminal_link, handle) = TerminalLink::new(link, TerminalConfig::default(), events);
    let (firmware, terminal) = MockTerminal::new(device);
    tokio::spawn(firmware.run());
    tokio::spawn(terminal_link.run());
    (FeedbackPlayer::new(Arc::new(handle)), terminal)
}

fn member() -> Member {
    Member {
        id: 7,
        name: "Grace Hopper".to_string(),
        public_name: Some("Grace".to_string()),
        phone_number: "+358401234567".to_string(),
        tag_ids: vec!["04a1b2c3".to_string()],
        active_until: Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_doorbell_animates_then_clears() {
    let (player, terminal) = start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    player.show_doorbell();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(terminal.led());
    assert!(terminal.display().is_some_and(|frame| !frame.is_blank()));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!terminal.led());
    assert!(terminal.display().is_some_and(|frame| frame.is_blank()));
    assert_eq!(
        terminal.received_commands().last(),
        Some(&ReaderCommand::Beep(Vec::new()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_unlocked_countdown_reaches_terminal() {
    let (player, terminal) = start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let until = Instant::now() + Duration::from_secs(2);
    player.show_unlocked(&member(), until, AccessMethod::Phone, true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(terminal.led());

    let draws = terminal
        .received_commands()
        .iter()
        .filter(|c| c.kind() == CommandKind::Draw)
        .count();
    assert!(draws >= 4, "{draws} frames drawn");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!terminal.led());
    assert!(terminal.display().is_some_and(|frame| frame.is_blank()));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_sequence_leaves_no_trace() {
    let (player, terminal) = start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    player.show_doorbell();
    tokio::time::sleep(Duration::from_millis(100)).await;
    player.show_membership_not_active(&member());
    tokio::time::sleep(Duration::from_secs(1)).await;

    // The doorbell lit the LED; the error screen never does.
    assert!(!terminal.led());
    assert!(terminal.display().is_some_and(|frame| !frame.is_blank()));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(terminal.display().is_some_and(|frame| frame.is_blank()));
}

#[tokio::test(start_paused = true)]
async fn test_switching_sequences_clears_before_first_frame() {
    let (player, terminal) = start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    player.show_doorbell();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(terminal.led());

    let mark = terminal.received_commands().len();
    player.show_unknown("Hidden number", false);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let after = terminal.received_commands().split_off(mark);
    // At most one doorbell frame was already on the wire.
    let start = after
        .iter()
        .position(|c| *c == ReaderCommand::Beep(Vec::new()))
        .expect("buzzer silenced");
    assert!(start <= 1, "{after:?}");
    assert_eq!(
        after[start..start + 3],
        [
            ReaderCommand::Beep(Vec::new()),
            ReaderCommand::Led(false),
            ReaderCommand::Draw(Bitmap::new()),
        ]
    );
    assert!(
        after[start + 3..]
            .iter()
            .any(|c| matches!(c, ReaderCommand::Draw(frame) if !frame.is_blank()))
    );
    assert!(!terminal.led());
}
