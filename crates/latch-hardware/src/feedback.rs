//! Feedback sequences on the terminal.
//!
//! A sequence is a short animation with its own melody: the unlock
//! countdown, the relock blink, the doorbell and the error screens. Only one
//! plays at a time. Starting a sequence cancels the running one and
//! immediately queues the neutral state (buzzer silent, LED off, display
//! blank) before the new sequence's first command. A sequence that runs to
//! the end leaves the same neutral state behind.
//!
//! Superseded sequences cannot leak commands: every command goes through a
//! [`Sequence`] context that is checked against the current generation
//! under the player lock.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use latch_core::{AccessMethod, Member};
use latch_protocol::{Bitmap, Icon, Note, ReaderCommand, parse_mml};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::terminal::TerminalSink;

const SAD_MELODY: &str = "A#20 R10 A60";
const WELCOME_MELODY: &str = "A#10 R10 > F10 R10 A#10 R10 > F10";
const GRACE_MELODY: &str = "A#10 R10 A#10 R10 A#10 R50 A#10 R10 A#10 R10 A#10";

/// One buzz per second while unlocked.
const UNLOCKED_BUZZ: Note = Note::new(440, 200, 16);

const LOCKED_NOTES: [Note; 3] = [Note::new(1852, 5, 32), Note::rest(10), Note::new(924, 5, 32)];

const DOORBELL_NOTES: [Note; 8] = [
    Note::new(1852, 10, 128),
    Note::new(0, 10, 128),
    Note::new(1392, 10, 128),
    Note::new(0, 10, 128),
    Note::new(1852, 10, 128),
    Note::new(0, 10, 128),
    Note::new(1392, 10, 128),
    Note::new(0, 100, 128),
];

/// Horizontal offsets of the swinging bell.
const BELL_SWING: [i32; 4] = [-4, 0, 4, 0];

const ERROR_SCREEN_TIME: Duration = Duration::from_secs(5);
const COUNTDOWN_FRAME: Duration = Duration::from_millis(100);
const LOCKED_BLINK: Duration = Duration::from_millis(500);
const DOORBELL_FRAME: Duration = Duration::from_millis(250);

/// Parse a built-in melody, falling back to silence.
fn melody(mml: &str) -> Vec<Note> {
    parse_mml(mml).unwrap_or_else(|e| {
        warn!(mml, error = %e, "Invalid melody");
        Vec::new()
    })
}

fn local_date(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

struct PlayerState {
    generation: u64,
    cancel: Option<CancellationToken>,
}

struct Shared {
    sink: Arc<dyn TerminalSink>,
    state: Mutex<PlayerState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Terminal access for one running sequence.
///
/// Commands are dropped once the sequence has been superseded, and
/// [`pause`](Sequence::pause) returns `false` as soon as it is canceled.
pub struct Sequence {
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
}

impl Sequence {
    fn send(&self, command: ReaderCommand) {
        let state = self.shared.lock();
        if state.generation == self.generation {
            self.shared.sink.send(command);
        }
    }

    pub fn set_led(&self, on: bool) {
        self.send(ReaderCommand::Led(on));
    }

    pub fn beep(&self, notes: Vec<Note>) {
        self.send(ReaderCommand::Beep(notes));
    }

    pub fn draw(&self, bitmap: Bitmap) {
        self.send(ReaderCommand::Draw(bitmap));
    }

    /// Wait for `duration`. Returns `false` if the sequence was canceled.
    pub async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Leave the neutral state behind, unless superseded meanwhile.
    fn finish(&self) {
        let mut state = self.shared.lock();
        if state.generation == self.generation {
            self.shared.sink.neutral();
            state.cancel = None;
        }
    }
}

/// Plays feedback sequences on a terminal, one at a time.
#[derive(Clone)]
pub struct FeedbackPlayer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FeedbackPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("FeedbackPlayer")
            .field("generation", &state.generation)
            .field("playing", &state.cancel.is_some())
            .finish()
    }
}

impl FeedbackPlayer {
    pub fn new(sink: Arc<dyn TerminalSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                state: Mutex::new(PlayerState {
                    generation: 0,
                    cancel: None,
                }),
            }),
        }
    }

    /// Check whether a sequence is playing.
    pub fn is_playing(&self) -> bool {
        self.shared.lock().cancel.is_some()
    }

    /// Cancel the running sequence, if any, and return to the neutral state.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
            state.generation += 1;
            self.shared.sink.neutral();
        }
    }

    /// Start a sequence, superseding the running one.
    ///
    /// Must be called within a tokio runtime.
    pub fn play<F, Fut>(&self, name: &'static str, body: F)
    where
        F: FnOnce(Sequence) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let sequence = {
            let mut state = self.shared.lock();
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
                self.shared.sink.neutral();
            }
            state.generation += 1;
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            Sequence {
                shared: Arc::clone(&self.shared),
                generation: state.generation,
                cancel,
            }
        };

        debug!(sequence = name, "Starting feedback sequence");
        tokio::spawn(async move {
            let cancel = sequence.cancel.clone();
            let finisher = Sequence {
                shared: Arc::clone(&sequence.shared),
                generation: sequence.generation,
                cancel: cancel.clone(),
            };
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = body(sequence) => finisher.finish(),
            }
        });
    }

    /// Unknown caller or tag: question mark icon and a short message.
    pub fn show_unknown(&self, message: &str, sound: bool) {
        let text = message.replace(' ', "\n");
        self.play("unknown", move |seq| async move {
            if sound {
                seq.beep(melody(SAD_MELODY));
            }

            let mut frame = Bitmap::new();
            frame.draw_icon(Icon::Unknown, 0, 2, 1);
            frame.draw_text(24, 0, &text, 2, true);
            seq.draw(frame);

            seq.pause(ERROR_SCREEN_TIME).await;
        });
    }

    /// Membership expired beyond the grace period.
    pub fn show_membership_not_active(&self, member: &Member) {
        let expires = local_date(member.active_until);
        self.play("not_active", move |seq| async move {
            seq.beep(melody(SAD_MELODY));

            let mut frame = Bitmap::new();
            frame.draw_icon(Icon::Error, 0, 4, 1);
            frame.draw_text(24, 2, "Expired", 2, true);
            frame.draw_text(0, 30, &expires, 2, true);
            seq.draw(frame);

            seq.pause(ERROR_SCREEN_TIME).await;
        });
    }

    /// Unlock countdown until `unlocked_until`. `expired` members (admitted
    /// on grace) get a different melody and a blinking expiry date.
    pub fn show_unlocked(
        &self,
        member: &Member,
        unlocked_until: Instant,
        method: AccessMethod,
        expired: bool,
    ) {
        let name = member.screen_name().to_string();
        let expires = local_date(member.active_until);
        let icon = match method {
            AccessMethod::Phone => Icon::Phone,
            AccessMethod::Tag => Icon::Tag,
        };

        self.play("unlocked", move |seq| async move {
            let start = Instant::now();
            let total = unlocked_until.saturating_duration_since(start);

            let mut notes = melody(if expired { GRACE_MELODY } else { WELCOME_MELODY });
            let buzzes = total.as_secs_f64().ceil() as usize;
            notes.extend(std::iter::repeat_n(UNLOCKED_BUZZ, buzzes));
            seq.beep(notes);
            seq.set_led(true);

            let name_scale = if Bitmap::text_width(&name, 2) <= Bitmap::WIDTH - 24 { 2 } else { 1 };
            let mut frame_index = 0u32;
            while Instant::now() < unlocked_until {
                let remaining = unlocked_until.saturating_duration_since(Instant::now());
                let fraction = if total.is_zero() {
                    0.0
                } else {
                    remaining.as_secs_f64() / total.as_secs_f64()
                };

                let mut frame = Bitmap::new();
                frame.draw_icon(icon, 0, 4, 1);
                frame.draw_text(24, 2, &name, name_scale, true);
                if expired && frame_index % 10 < 5 {
                    frame.fill_rect(0, 28, 127, 46, true);
                    frame.draw_text(2, 30, &expires, 2, false);
                } else {
                    frame.draw_text(2, 30, &expires, 2, true);
                }
                frame.progress_bar(56, 63, fraction);
                seq.draw(frame);

                if !seq.pause(COUNTDOWN_FRAME).await {
                    return;
                }
                frame_index += 1;
            }
        });
    }

    /// Lock re-engaged: closed padlock blinking three times.
    pub fn show_locked(&self) {
        self.play("locked", |seq| async move {
            seq.beep(LOCKED_NOTES.to_vec());

            for _ in 0..3 {
                let mut frame = Bitmap::new();
                frame.draw_icon(Icon::Locked, 48, 16, 2);
                seq.draw(frame);
                if !seq.pause(LOCKED_BLINK).await {
                    return;
                }

                seq.draw(Bitmap::new());
                if !seq.pause(LOCKED_BLINK).await {
                    return;
                }
            }
        });
    }

    /// Doorbell pressed: chime and a swinging bell with a flashing LED.
    pub fn show_doorbell(&self) {
        self.play("doorbell", |seq| async move {
            seq.beep(DOORBELL_NOTES.repeat(2));

            for i in 0..8 {
                let mut frame = Bitmap::new();
                frame.draw_icon(Icon::Bell, 48 + BELL_SWING[i % 4], 16, 2);
                seq.draw(frame);
                seq.set_led(i % 4 < 2);

                if !seq.pause(DOORBELL_FRAME).await {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use latch_protocol::CommandKind;

    #[derive(Default)]
    struct RecordingSink {
        commands: Mutex<Vec<ReaderCommand>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<ReaderCommand> {
            std::mem::take(&mut *self.commands.lock().unwrap())
        }
    }

    impl TerminalSink for RecordingSink {
        fn send(&self, command: ReaderCommand) {
            self.commands.lock().unwrap().push(command);
        }
    }

    fn player() -> (FeedbackPlayer, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (FeedbackPlayer::new(sink.clone()), sink)
    }

    fn member() -> Member {
        Member {
            id: 42,
            name: "Ada Lovelace".to_string(),
            public_name: Some("Ada".to_string()),
            phone_number: "+358401234567".to_string(),
            tag_ids: vec!["04a1b2c3".to_string()],
            active_until: Utc.with_ymd_and_hms(2026, 12, 31, 12, 0, 0).unwrap(),
        }
    }

    fn is_teardown(commands: &[ReaderCommand]) -> bool {
        commands
            == [
                ReaderCommand::Beep(Vec::new()),
                ReaderCommand::Led(false),
                ReaderCommand::Draw(Bitmap::new()),
            ]
    }

    #[test]
    fn test_builtin_melodies_parse() {
        for mml in [SAD_MELODY, WELCOME_MELODY, GRACE_MELODY] {
            assert!(!melody(mml).is_empty(), "{mml}");
        }
    }

    #[test]
    fn test_invalid_melody_is_silent() {
        assert!(melody("A#").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_sequence_tears_down() {
        let (player, sink) = player();
        player.show_unknown("Hidden number", true);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let commands = sink.take();

        assert_eq!(commands[0], ReaderCommand::Beep(melody(SAD_MELODY)));
        assert_eq!(commands[1].kind(), CommandKind::Draw);
        assert!(is_teardown(&commands[2..]));
        assert!(!player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_sequence_cancels_running_one() {
        let (player, sink) = player();
        player.show_doorbell();
        tokio::time::sleep(Duration::from_millis(300)).await;
        sink.take();

        player.show_locked();
        let queued = sink.take();
        assert!(is_teardown(&queued), "teardown queued synchronously");

        tokio::time::sleep(Duration::from_millis(10)).await;
        let commands = sink.take();
        assert_eq!(commands[0], ReaderCommand::Beep(LOCKED_NOTES.to_vec()));

        // Nothing from the doorbell after it was superseded.
        tokio::time::sleep(Duration::from_secs(4)).await;
        let rest = sink.take();
        assert!(!rest.contains(&ReaderCommand::Led(true)));
        assert!(is_teardown(&rest[rest.len() - 3..]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlocked_countdown() {
        let (player, sink) = player();
        let until = Instant::now() + Duration::from_secs(3);
        player.show_unlocked(&member(), until, AccessMethod::Tag, false);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = sink.take();
        let ReaderCommand::Beep(notes) = &first[0] else {
            panic!("expected melody first, got {:?}", first[0]);
        };
        let buzzes = notes.iter().filter(|n| **n == UNLOCKED_BUZZ).count();
        assert_eq!(buzzes, 3);
        assert_eq!(first[1], ReaderCommand::Led(true));

        tokio::time::sleep(Duration::from_secs(4)).await;
        let rest = sink.take();
        let frames = rest
            .iter()
            .chain(&first)
            .filter(|c| c.kind() == CommandKind::Draw)
            .count();
        assert!((29..=32).contains(&frames), "{frames} frames");
        assert!(is_teardown(&rest[rest.len() - 3..]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_to_neutral() {
        let (player, sink) = player();
        player.show_doorbell();
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.take();

        player.stop();
        assert!(is_teardown(&sink.take()));
        assert!(!player.is_playing());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(sink.take().is_empty());

        player.stop();
        assert!(sink.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_doorbell_flashes_led() {
        let (player, sink) = player();
        player.show_doorbell();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let leds: Vec<bool> = sink
            .take()
            .iter()
            .filter_map(|c| match c {
                ReaderCommand::Led(on) => Some(*on),
                _ => None,
            })
            .collect();
        assert_eq!(
            leds,
            vec![true, true, false, false, true, true, false, false, false]
        );
    }
}
