//! Buzzer notes and MML melody notation.
//!
//! The terminal buzzer plays a list of notes, each packed as four bytes:
//! frequency in Hz (`i16`, little-endian, 0 for silence), length in units of
//! 10 ms, and PWM duty cycle (0-255).
//!
//! Melodies are authored in a small subset of Music Macro Language:
//!
//! | Token        | Meaning                                        |
//! |--------------|------------------------------------------------|
//! | `A20`        | note `A` for 20 units                          |
//! | `A#20`       | sharp                                          |
//! | `R10`        | rest for 10 units                              |
//! | `>` / `<`    | one octave up / down                           |
//! | `O2`         | set octave                                     |
//!
//! Whitespace is ignored.

use bytes::{BufMut, BytesMut};

use crate::{ProtocolError, Result};

/// Duty cycle used for notes produced by [`parse_mml`].
pub const MML_DUTY: u8 = 128;

/// A single buzzer note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    /// Frequency in Hz; `0` is silence.
    pub frequency: i16,

    /// Length in units of 10 ms.
    pub length: u8,

    /// PWM duty cycle, 0-255.
    pub duty: u8,
}

impl Note {
    /// Wire size of one note.
    pub const ENCODED_LEN: usize = 4;

    /// Create a note.
    pub const fn new(frequency: i16, length: u8, duty: u8) -> Self {
        Self {
            frequency,
            length,
            duty,
        }
    }

    /// Silence for `length` units.
    pub const fn rest(length: u8) -> Self {
        Self::new(0, length, 0)
    }

    /// Playing time of the note.
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(self.length) * 10)
    }

    /// Append the packed note to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i16_le(self.frequency);
        dst.put_u8(self.length);
        dst.put_u8(self.duty);
    }
}

/// Semitone offset of each natural note within an octave.
fn semitone_of(name: u8) -> Option<i32> {
    match name {
        b'C' => Some(0),
        b'D' => Some(2),
        b'E' => Some(4),
        b'F' => Some(5),
        b'G' => Some(7),
        b'A' => Some(9),
        b'B' => Some(11),
        _ => None,
    }
}

/// Frequency for a semitone index counted from the reference octave.
fn frequency_of(semitone: i32) -> i16 {
    let hz = 440.0_f64 * 2.0_f64.powf(f64::from(semitone + 3) / 12.0);
    hz.clamp(0.0, f64::from(i16::MAX)) as i16
}

/// Parse an MML melody into notes.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidMelody`] for an unknown token, a note
/// without a length, or a length that does not fit in a byte. No partial
/// melody is returned.
///
/// # Example
///
/// ```
/// use latch_protocol::{Note, parse_mml};
///
/// let notes = parse_mml("A#20 R10 A60").unwrap();
/// assert_eq!(
///     notes,
///     vec![Note::new(932, 20, 128), Note::rest(10), Note::new(880, 60, 128)]
/// );
/// ```
pub fn parse_mml(mml: &str) -> Result<Vec<Note>> {
    let bytes = mml.as_bytes();
    let mut notes = Vec::new();
    let mut octave: i32 = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let token = bytes[pos];
        pos += 1;

        match token {
            b if b.is_ascii_whitespace() => {}
            b'<' => octave -= 1,
            b'>' => octave += 1,
            b'O' => {
                let (value, next) = read_number(bytes, pos, start)?;
                octave = i32::try_from(value).map_err(|_| invalid(start, "octave out of range"))?;
                pos = next;
            }
            b'R' => {
                let (value, next) = read_number(bytes, pos, start)?;
                notes.push(Note::rest(length_of(value, start)?));
                pos = next;
            }
            name => {
                let Some(base) = semitone_of(name) else {
                    return Err(invalid(start, format!("unexpected {:?}", name as char)));
                };
                let mut semitone = octave * 12 + base;
                if bytes.get(pos) == Some(&b'#') {
                    semitone += 1;
                    pos += 1;
                }
                let (value, next) = read_number(bytes, pos, start)?;
                notes.push(Note::new(
                    frequency_of(semitone),
                    length_of(value, start)?,
                    MML_DUTY,
                ));
                pos = next;
            }
        }
    }

    Ok(notes)
}

fn read_number(bytes: &[u8], pos: usize, token_start: usize) -> Result<(u32, usize)> {
    let digits = bytes[pos..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return Err(invalid(token_start, "missing number"));
    }

    let text = std::str::from_utf8(&bytes[pos..pos + digits])
        .map_err(|e| invalid(token_start, e.to_string()))?;
    let value = text
        .parse::<u32>()
        .map_err(|e| invalid(token_start, e.to_string()))?;
    Ok((value, pos + digits))
}

fn length_of(value: u32, offset: usize) -> Result<u8> {
    u8::try_from(value).map_err(|_| invalid(offset, format!("length {value} exceeds 255")))
}

fn invalid(offset: usize, message: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidMelody {
        offset,
        message: message.into(),
    }
}
