//! Emulated terminal firmware on the far side of a [`MemoryLink`].
//!
//! [`MemoryLink`]: super::MemoryLink

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use latch_protocol::{Bitmap, ReaderCommand, ReaderFrame};
use tracing::{debug, trace, warn};

use super::link::MemoryLinkHandle;

#[derive(Debug, Default)]
struct FirmwareState {
    pending: VecDeque<ReaderFrame>,
    received: Vec<ReaderCommand>,
    led: bool,
    display: Option<Bitmap>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<FirmwareState>,
    silent: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FirmwareState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Emulated terminal answering frames written to a memory link.
///
/// Every received command is answered with one line: a queued input event
/// (button or tag) if there is one, `p` otherwise. Draw frames can be logged
/// as braille art to follow the display in simulation logs.
#[derive(Debug)]
pub struct MockTerminal {
    link: MemoryLinkHandle,
    shared: Arc<Shared>,
    log_display: bool,
}

impl MockTerminal {
    /// Attach firmware to the device side of `link`.
    pub fn new(link: MemoryLinkHandle) -> (Self, MockTerminalHandle) {
        let shared = Arc::new(Shared::default());
        let handle = MockTerminalHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                link,
                shared,
                log_display: false,
            },
            handle,
        )
    }

    /// Log every displayed frame at `info`.
    pub fn with_display_logging(mut self) -> Self {
        self.log_display = true;
        self
    }

    /// Serve frames until the task is dropped.
    pub async fn run(self) {
        let mut buffer = BytesMut::new();
        loop {
            self.link.wait_written().await;
            buffer.extend_from_slice(&self.link.take_written());

            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let frame = buffer.split_to(newline + 1);
                self.handle_frame(&frame[..newline]);
            }
        }
    }

    fn handle_frame(&self, frame: &[u8]) {
        let command = match ReaderCommand::parse(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Mock terminal received malformed frame");
                return;
            }
        };
        trace!(kind = ?command.kind(), "Mock terminal received command");

        let response = {
            let mut state = self.shared.lock();
            match &command {
                ReaderCommand::Led(on) => state.led = *on,
                ReaderCommand::Draw(bitmap) => {
                    if self.log_display {
                        tracing::info!(target: "display", "\n{}", bitmap.to_braille());
                    }
                    state.display = Some(bitmap.clone());
                }
                ReaderCommand::Reset => {
                    state.led = false;
                    state.display = None;
                }
                ReaderCommand::Beep(notes) if !notes.is_empty() => {
                    debug!(notes = notes.len(), "Mock terminal playing melody");
                }
                ReaderCommand::Beep(_) | ReaderCommand::Poll => {}
            }
            state.received.push(command);
            state.pending.pop_front().unwrap_or(ReaderFrame::Ack)
        };

        if self.shared.silent.load(Ordering::SeqCst) {
            return;
        }
        self.link.inject(&response.to_line());
    }
}

/// Control handle for a [`MockTerminal`].
#[derive(Debug, Clone)]
pub struct MockTerminalHandle {
    shared: Arc<Shared>,
}

impl MockTerminalHandle {
    /// Queue a tag presentation for the next response.
    pub fn present_tag(&self, uid: &[u8]) {
        self.shared
            .lock()
            .pending
            .push_back(ReaderFrame::Tag(uid.to_vec()));
    }

    /// Queue a button edge for the next response.
    pub fn set_button(&self, pressed: bool) {
        self.shared
            .lock()
            .pending
            .push_back(ReaderFrame::Button(pressed));
    }

    /// Stop (or resume) answering commands.
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::SeqCst);
    }

    /// Every command received so far, polls included.
    pub fn received(&self) -> Vec<ReaderCommand> {
        self.shared.lock().received.clone()
    }

    /// Received commands other than polls.
    pub fn received_commands(&self) -> Vec<ReaderCommand> {
        self.received()
            .into_iter()
            .filter(|c| !matches!(c, ReaderCommand::Poll))
            .collect()
    }

    /// Current LED state.
    pub fn led(&self) -> bool {
        self.shared.lock().led
    }

    /// Frame currently on the display, if any was drawn since reset.
    pub fn display(&self) -> Option<Bitmap> {
        self.shared.lock().display.clone()
    }
}
