//! RFID reader terminal link.
//!
//! The terminal (tag reader, 128x64 display, buzzer, LED and doorbell
//! button) is a strict request/response device: exactly one frame is
//! outstanding at any time and each one is answered by one line. The link
//! task serves queued commands newest first and polls with `P` when idle,
//! so input events are picked up at a steady rate.
//!
//! ```text
//! open ─► reset ─► [send one frame ─► await one line]* ─┬─ timeout ─► reset
//!  ▲                                                     └─ I/O error ─► close, backoff
//!  └──────────────────────────────────────────────────────────────────┘
//! ```

mod debounce;
mod stack;

pub use debounce::TagDebouncer;
pub use stack::CommandStack;

use std::time::Duration;

use bytes::BytesMut;
use latch_core::constants::{
    DEFAULT_READER_RESPONSE_TIMEOUT, DEFAULT_RECONNECT_BACKOFF, DEFAULT_TAG_REPEAT_WINDOW,
    READER_IDLE_POLL_DELAY,
};
use latch_core::settings::ReaderSettings;
use latch_protocol::{Bitmap, Note, ReaderCommand, ReaderFrame, TerminalCodec};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, trace, warn};

use crate::events::{EventSender, TerminalEvent, emit};
use crate::link::SerialLink;
use crate::log_once::LogOnce;
use crate::{HardwareError, Result};

/// Interval between reads while waiting for a response.
const RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Pause after a response timeout before the terminal is reset.
const TIMEOUT_SETTLE_DELAY: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 256;

/// Terminal link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    /// Longest wait for the response to one frame.
    pub response_timeout: Duration,

    /// Delay before reopening after a transport failure.
    pub reconnect_backoff: Duration,

    /// Repeat reads of one tag within this window are one presentation.
    pub tag_repeat_window: Duration,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_READER_RESPONSE_TIMEOUT,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            tag_repeat_window: DEFAULT_TAG_REPEAT_WINDOW,
        }
    }
}

impl From<&ReaderSettings> for TerminalConfig {
    fn from(settings: &ReaderSettings) -> Self {
        Self {
            response_timeout: settings.response_timeout(),
            reconnect_backoff: settings.reconnect_backoff(),
            tag_repeat_window: settings.tag_repeat_window(),
        }
    }
}

/// Anything that accepts terminal commands.
pub trait TerminalSink: Send + Sync + 'static {
    /// Queue a command. Never waits for the terminal.
    fn send(&self, command: ReaderCommand);

    fn set_led(&self, on: bool) {
        self.send(ReaderCommand::Led(on));
    }

    /// Replace the current melody; an empty list silences the buzzer.
    fn beep(&self, notes: Vec<Note>) {
        self.send(ReaderCommand::Beep(notes));
    }

    fn draw(&self, bitmap: Bitmap) {
        self.send(ReaderCommand::Draw(bitmap));
    }

    /// Silence the buzzer, turn the LED off and blank the display, before
    /// any command sent afterwards takes effect.
    fn neutral(&self) {
        self.beep(Vec::new());
        self.set_led(false);
        self.draw(Bitmap::new());
    }
}

/// What a handle hands to the link task.
#[derive(Debug)]
enum Outbound {
    Command(ReaderCommand),
    Neutral,
}

/// Cloneable command handle to a running [`TerminalLink`].
#[derive(Debug, Clone)]
pub struct TerminalHandle {
    commands: mpsc::UnboundedSender<Outbound>,
}

impl TerminalHandle {
    fn forward(&self, outbound: Outbound) {
        if self.commands.send(outbound).is_err() {
            trace!("Terminal link not running, command dropped");
        }
    }
}

impl TerminalHandle {
    /// Handle that drops every command, for sites without a terminal.
    pub fn disconnected() -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        Self { commands }
    }
}

impl TerminalSink for TerminalHandle {
    fn send(&self, command: ReaderCommand) {
        self.forward(Outbound::Command(command));
    }

    fn neutral(&self) {
        self.forward(Outbound::Neutral);
    }
}

/// Terminal link task.
pub struct TerminalLink<L> {
    link: L,
    config: TerminalConfig,
    events: EventSender,
    commands: mpsc::UnboundedReceiver<Outbound>,
    stack: CommandStack,
    codec: TerminalCodec,
    rx_buf: BytesMut,
    tags: TagDebouncer,
    errors: LogOnce,
}

impl<L: SerialLink> TerminalLink<L> {
    pub fn new(link: L, config: TerminalConfig, events: EventSender) -> (Self, TerminalHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let tags = TagDebouncer::new(config.tag_repeat_window);

        let terminal = Self {
            link,
            config,
            events,
            commands,
            stack: CommandStack::new(),
            codec: TerminalCodec::new(),
            rx_buf: BytesMut::with_capacity(READ_CHUNK),
            tags,
            errors: LogOnce::new(),
        };
        (terminal, TerminalHandle { commands: commands_tx })
    }

    /// Serve the terminal, reconnecting after failures, until every handle
    /// is dropped.
    pub async fn run(mut self) {
        loop {
            match self.serve().await {
                Ok(()) => break,
                Err(e) => {
                    if self.errors.check(&e) {
                        error!(device = %self.link.name(), error = %e, "Terminal link error");
                    }
                    self.link.close();
                    tokio::time::sleep(self.config.reconnect_backoff).await;
                }
            }
        }

        self.link.close();
        debug!("Terminal link stopped");
    }

    /// One connection lifetime. `Ok` means every handle was dropped.
    async fn serve(&mut self) -> Result<()> {
        self.link.open()?;
        info!(device = %self.link.name(), "Terminal link opened");
        self.reset();

        loop {
            if !self.drain_commands() {
                return Ok(());
            }
            if self.stack.is_empty() {
                tokio::time::sleep(READER_IDLE_POLL_DELAY).await;
                if !self.drain_commands() {
                    return Ok(());
                }
            }

            let command = self.stack.pop().unwrap_or(ReaderCommand::Poll);
            if command != ReaderCommand::Poll {
                trace!(kind = ?command.kind(), "Sending terminal command");
            }
            self.write_frame(&command).await?;

            match self.read_response().await? {
                Some(frame) => {
                    self.errors.clear();
                    self.handle_frame(frame);
                }
                None => {
                    if self.errors.check(&"response timeout") {
                        warn!(device = %self.link.name(), "Terminal response timeout");
                    }
                    tokio::time::sleep(TIMEOUT_SETTLE_DELAY).await;
                    self.reset();
                }
            }
        }
    }

    /// Bring the terminal to a known state: drop everything queued, reset
    /// it and blank the display.
    fn reset(&mut self) {
        while self.commands.try_recv().is_ok() {}
        self.stack.clear();
        self.rx_buf.clear();
        self.stack.push(ReaderCommand::Reset);
        self.stack.push(ReaderCommand::Draw(Bitmap::new()));
    }

    /// Move queued commands onto the stack. Returns `false` once every
    /// handle is gone.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Outbound::Command(command)) => self.stack.push(command),
                Ok(Outbound::Neutral) => self.stack.push_neutral(),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    async fn write_frame(&mut self, command: &ReaderCommand) -> Result<()> {
        let mut frame = BytesMut::new();
        self.codec.encode(command, &mut frame)?;

        let deadline = Instant::now() + self.config.response_timeout;
        let mut sent = 0;
        while sent < frame.len() {
            sent += self.link.write(&frame[sent..])?;
            if sent < frame.len() {
                if Instant::now() >= deadline {
                    return Err(HardwareError::write_timeout(self.link.name()));
                }
                tokio::time::sleep(RESPONSE_POLL_INTERVAL).await;
            }
        }
        Ok(())
    }

    /// Wait for one response line. `None` on timeout.
    async fn read_response(&mut self) -> Result<Option<ReaderFrame>> {
        let deadline = Instant::now() + self.config.response_timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            loop {
                let n = self.link.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                self.rx_buf.extend_from_slice(&chunk[..n]);
            }

            match self.codec.decode(&mut self.rx_buf) {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Discarding terminal input"),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RESPONSE_POLL_INTERVAL).await;
        }
    }

    fn handle_frame(&mut self, frame: ReaderFrame) {
        match &frame {
            ReaderFrame::Ack => {}
            ReaderFrame::Button(pressed) => {
                debug!(pressed, "Doorbell button");
                emit(&self.events, TerminalEvent::Button(*pressed));
            }
            ReaderFrame::Tag(_) => {
                let Some(uid) = frame.tag_hex() else {
                    return;
                };
                if self.tags.accept(&uid, Instant::now()) {
                    info!(tag = %uid, "Tag read");
                    emit(&self.events, TerminalEvent::TagRead(uid));
                }
            }
            ReaderFrame::Unknown(raw) => {
                debug!(len = raw.len(), "Unrecognized terminal response");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventReceiver, HardwareEvent, event_channel};
    use crate::mock::{MemoryLink, MemoryLinkHandle, MockTerminal, MockTerminalHandle};
    use latch_protocol::CommandKind;

    struct Harness {
        handle: TerminalHandle,
        link: MemoryLinkHandle,
        terminal: MockTerminalHandle,
        events: EventReceiver,
    }

    fn start() -> Harness {
        let (link, link_handle) = MemoryLink::new("terminal");
        let (events_tx, events) = event_channel();
        let (terminal_link, handle) = TerminalLink::new(link, TerminalConfig::default(), events_tx);
        let (firmware, terminal) = MockTerminal::new(link_handle.clone());
        tokio::spawn(firmware.run());
        tokio::spawn(terminal_link.run());
        Harness {
            handle,
            link: link_handle,
            terminal,
            events,
        }
    }

    fn drain(events: &mut EventReceiver) -> Vec<TerminalEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let HardwareEvent::Terminal(event) = event {
                out.push(event);
            }
        }
        out
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_resets_and_blanks() {
        let h = start();
        settle().await;

        let received = h.terminal.received_commands();
        assert_eq!(received[0], ReaderCommand::Reset);
        assert_eq!(received[1], ReaderCommand::Draw(Bitmap::new()));
        assert!(h.terminal.received().len() > 2, "idle link keeps polling");
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_served_newest_first() {
        let h = start();
        settle().await;

        let mut frame = Bitmap::new();
        frame.draw_text(0, 0, "HI", 1, true);
        h.handle.set_led(true);
        h.handle.beep(vec![Note::new(440, 10, 128)]);
        h.handle.draw(Bitmap::new());
        h.handle.draw(frame.clone());
        settle().await;

        let kinds: Vec<_> = h.terminal.received_commands()[2..]
            .iter()
            .map(ReaderCommand::kind)
            .collect();
        assert_eq!(kinds, vec![CommandKind::Draw, CommandKind::Beep, CommandKind::Led]);
        assert_eq!(h.terminal.display(), Some(frame));
        assert!(h.terminal.led());
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_edges() {
        let mut h = start();
        settle().await;

        h.terminal.set_button(true);
        h.terminal.set_button(false);
        settle().await;

        assert_eq!(
            drain(&mut h.events),
            vec![TerminalEvent::Button(true), TerminalEvent::Button(false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_tag_raises_once() {
        let mut h = start();
        settle().await;

        for _ in 0..6 {
            h.terminal.present_tag(&[0x04, 0xa1, 0xb2, 0xc3]);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        h.terminal.present_tag(&[0xde, 0xad, 0xbe, 0xef]);
        settle().await;

        assert_eq!(
            drain(&mut h.events),
            vec![
                TerminalEvent::TagRead("04a1b2c3".to_string()),
                TerminalEvent::TagRead("deadbeef".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tag_accepted_again_after_window() {
        let mut h = start();
        settle().await;

        h.terminal.present_tag(&[0x04, 0xa1, 0xb2, 0xc3]);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        h.terminal.present_tag(&[0x04, 0xa1, 0xb2, 0xc3]);
        settle().await;

        assert_eq!(drain(&mut h.events).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resets_terminal() {
        let mut h = start();
        settle().await;

        // Unanswered frame times out after 1 s; the reset follows 100 ms later.
        h.terminal.set_silent(true);
        tokio::time::sleep(Duration::from_millis(1050)).await;
        h.terminal.set_silent(false);
        settle().await;

        let resets = h
            .terminal
            .received_commands()
            .iter()
            .filter(|c| **c == ReaderCommand::Reset)
            .count();
        assert_eq!(resets, 2);
        assert!(h.link.is_open());

        h.terminal.present_tag(&[0x04, 0xa1, 0xb2, 0xc3]);
        settle().await;
        assert_eq!(
            drain(&mut h.events),
            vec![TerminalEvent::TagRead("04a1b2c3".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_unplug() {
        let h = start();
        settle().await;
        assert_eq!(h.link.open_count(), 1);

        h.link.disconnect();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!h.link.is_open());
        assert_eq!(h.link.open_count(), 1);

        h.link.reconnect();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(h.link.is_open());
        assert_eq!(h.link.open_count(), 2);

        let resets = h
            .terminal
            .received_commands()
            .iter()
            .filter(|c| **c == ReaderCommand::Reset)
            .count();
        assert_eq!(resets, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_handles_dropped() {
        let (link, _link_handle) = MemoryLink::new("terminal");
        let (events_tx, _events) = event_channel();
        let (terminal_link, handle) = TerminalLink::new(link, TerminalConfig::default(), events_tx);
        let task = tokio::spawn(terminal_link.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("link task should stop")
            .unwrap();
    }

    #[test]
    fn test_disconnected_handle_drops_commands() {
        let handle = TerminalHandle::disconnected();
        handle.set_led(true);
        handle.beep(Vec::new());
    }
}
