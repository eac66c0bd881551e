//! Frame codec for the RFID reader terminal.
//!
//! The host drives the terminal with single-letter commands followed by a
//! binary payload. Before transmission `\` is escaped as `\\` and newline
//! as `\n` (backslash, `n`), and the frame is terminated by a real newline:
//!
//! ```text
//! L <0x00|0x01>                  LED off/on
//! B <note>*                      play notes (empty list stops playback)
//! D <1024 bytes>                 draw a frame
//! R                              reset
//! P                              poll
//! ```
//!
//! Every command is answered by exactly one newline-terminated line:
//!
//! ```text
//! p                              acknowledged, nothing to report
//! b <state>                      button state, 0x01 (or '1') when pressed
//! r <uid bytes>                  tag read, uid at least 4 bytes
//! ```
//!
//! Responses are not escaped. Unrecognized responses still count as the
//! answer to the outstanding command.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{Bitmap, Note, ProtocolError, Result};

/// Longest response line accepted before the buffer is discarded.
const MAX_RESPONSE_LENGTH: usize = 256;

/// Minimum uid length of a tag read.
const MIN_UID_LENGTH: usize = 4;

/// A host-to-terminal command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderCommand {
    /// Switch the LED.
    Led(bool),

    /// Replace the current melody. An empty list silences the buzzer.
    Beep(Vec<Note>),

    /// Replace the display contents.
    Draw(Bitmap),

    /// Reset the terminal.
    Reset,

    /// Ask for pending events.
    Poll,
}

/// Discriminant of a [`ReaderCommand`], used to coalesce queued commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Led,
    Beep,
    Draw,
    Reset,
    Poll,
}

impl ReaderCommand {
    /// Kind of the command.
    pub fn kind(&self) -> CommandKind {
        match self {
            ReaderCommand::Led(_) => CommandKind::Led,
            ReaderCommand::Beep(_) => CommandKind::Beep,
            ReaderCommand::Draw(_) => CommandKind::Draw,
            ReaderCommand::Reset => CommandKind::Reset,
            ReaderCommand::Poll => CommandKind::Poll,
        }
    }

    /// Command letter on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            ReaderCommand::Led(_) => b'L',
            ReaderCommand::Beep(_) => b'B',
            ReaderCommand::Draw(_) => b'D',
            ReaderCommand::Reset => b'R',
            ReaderCommand::Poll => b'P',
        }
    }

    /// Unescaped command bytes (letter and payload).
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.tag());
        match self {
            ReaderCommand::Led(on) => buf.put_u8(u8::from(*on)),
            ReaderCommand::Beep(notes) => {
                buf.reserve(notes.len() * Note::ENCODED_LEN);
                for note in notes {
                    note.encode(&mut buf);
                }
            }
            ReaderCommand::Draw(bitmap) => buf.put_slice(bitmap.as_bytes()),
            ReaderCommand::Reset | ReaderCommand::Poll => {}
        }
        buf.to_vec()
    }

    /// Complete escaped and terminated frame.
    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::new();
        escape_into(&self.payload(), &mut buf);
        buf.put_u8(b'\n');
        buf.freeze()
    }

    /// Parse a received frame (without its terminating newline).
    ///
    /// Used on the terminal side of a simulated link.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for a dangling escape, an
    /// unknown command letter, or a payload of the wrong size.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let raw = unescape(frame)?;
        let Some((&tag, payload)) = raw.split_first() else {
            return Err(ProtocolError::malformed("terminal frame", "empty frame"));
        };

        match tag {
            b'L' => match payload {
                [state] => Ok(ReaderCommand::Led(*state != 0)),
                _ => Err(wrong_size("L", payload.len())),
            },
            b'B' => {
                if payload.len() % Note::ENCODED_LEN != 0 {
                    return Err(wrong_size("B", payload.len()));
                }
                let notes = payload
                    .chunks_exact(Note::ENCODED_LEN)
                    .map(|c| Note::new(i16::from_le_bytes([c[0], c[1]]), c[2], c[3]))
                    .collect();
                Ok(ReaderCommand::Beep(notes))
            }
            b'D' => Bitmap::from_wire(payload)
                .map(ReaderCommand::Draw)
                .ok_or_else(|| wrong_size("D", payload.len())),
            b'R' if payload.is_empty() => Ok(ReaderCommand::Reset),
            b'P' if payload.is_empty() => Ok(ReaderCommand::Poll),
            other => Err(ProtocolError::malformed(
                "terminal frame",
                format!("unknown command {:?}", other as char),
            )),
        }
    }
}

fn wrong_size(command: &str, len: usize) -> ProtocolError {
    ProtocolError::malformed(
        "terminal frame",
        format!("{command} payload of {len} bytes"),
    )
}

/// Escape `\` and newline, appending to `dst`.
pub fn escape_into(raw: &[u8], dst: &mut BytesMut) {
    dst.reserve(raw.len() + raw.len() / 8);
    for &b in raw {
        match b {
            b'\\' => dst.put_slice(b"\\\\"),
            b'\n' => dst.put_slice(b"\\n"),
            other => dst.put_u8(other),
        }
    }
}

/// Reverse [`escape_into`].
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] for a trailing backslash or an
/// unknown escape.
pub fn unescape(escaped: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut bytes = escaped.iter();
    while let Some(&b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(b'n') => out.push(b'\n'),
            Some(other) => {
                return Err(ProtocolError::malformed(
                    "terminal frame",
                    format!("unknown escape \\{}", *other as char),
                ));
            }
            None => {
                return Err(ProtocolError::malformed(
                    "terminal frame",
                    "dangling escape",
                ));
            }
        }
    }
    Ok(out)
}

/// A terminal-to-host response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderFrame {
    /// Nothing to report.
    Ack,

    /// Button state changed.
    Button(bool),

    /// A tag was presented; raw uid bytes.
    Tag(Vec<u8>),

    /// Any other line, including empty ones.
    Unknown(Vec<u8>),
}

impl ReaderFrame {
    /// Classify a response line (without its terminating newline).
    pub fn parse(line: &[u8]) -> Self {
        match line {
            [b'p'] => ReaderFrame::Ack,
            [b'b', state] => ReaderFrame::Button(*state == 0x01 || *state == b'1'),
            [b'r', uid @ ..] if uid.len() >= MIN_UID_LENGTH => ReaderFrame::Tag(uid.to_vec()),
            other => ReaderFrame::Unknown(other.to_vec()),
        }
    }

    /// Lowercase hex of a tag uid, `None` for other frames.
    pub fn tag_hex(&self) -> Option<String> {
        match self {
            ReaderFrame::Tag(uid) => Some(uid.iter().map(|b| format!("{b:02x}")).collect()),
            _ => None,
        }
    }

    /// Wire bytes of the response, newline included.
    ///
    /// Used on the terminal side of a simulated link.
    pub fn to_line(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            ReaderFrame::Ack => buf.put_u8(b'p'),
            ReaderFrame::Button(pressed) => {
                buf.put_u8(b'b');
                buf.put_u8(u8::from(*pressed));
            }
            ReaderFrame::Tag(uid) => {
                buf.put_u8(b'r');
                buf.put_slice(uid);
            }
            ReaderFrame::Unknown(raw) => buf.put_slice(raw),
        }
        buf.put_u8(b'\n');
        buf.freeze()
    }
}

/// Host-side codec: encodes [`ReaderCommand`]s, decodes [`ReaderFrame`]s.
#[derive(Debug, Default)]
pub struct TerminalCodec {
    _private: (),
}

impl TerminalCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for TerminalCodec {
    type Item = ReaderFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ReaderFrame>> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_RESPONSE_LENGTH {
                let size = src.len();
                src.clear();
                return Err(ProtocolError::FrameTooLarge {
                    size,
                    max: MAX_RESPONSE_LENGTH,
                });
            }
            return Ok(None);
        };

        let line = src.split_to(newline + 1);
        Ok(Some(ReaderFrame::parse(&line[..newline])))
    }
}

impl Encoder<&ReaderCommand> for TerminalCodec {
    type Error = ProtocolError;

    fn encode(&mut self, command: &ReaderCommand, dst: &mut BytesMut) -> Result<()> {
        escape_into(&command.payload(), dst);
        dst.put_u8(b'\n');
        Ok(())
    }
}
