//! AT command line codec for the cellular modem.
//!
//! The modem control TTY speaks newline-delimited text. Unsolicited result
//! codes are interleaved with command echoes and `OK` responses; only three
//! of them matter to the door controller:
//!
//! ```text
//! ^RSSI:17                       signal strength report
//! +CLIP:"0401234567",129,,,,0    caller ID, repeated for every ring
//! ^CEND:1,0,104,16               call ended
//! ```
//!
//! Everything else decodes to [`ModemLine::Other`] and is ignored.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//! use latch_protocol::{ModemCodec, ModemLine, parse_line};
//!
//! let mut codec = ModemCodec::new();
//! let mut buffer = BytesMut::from(&b"\r\n+CLIP:\"0401234567\",129\r\n"[..]);
//!
//! let mut lines = Vec::new();
//! while let Some(line) = codec.decode(&mut buffer).unwrap() {
//!     lines.push(parse_line(&line, "+358").unwrap());
//! }
//! assert_eq!(
//!     lines.last(),
//!     Some(&ModemLine::CallerId(Some("+358401234567".to_string())))
//! );
//! ```

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{ProtocolError, Result};

/// Longest line accepted before the buffer is discarded.
const MAX_LINE_LENGTH: usize = 1024;

/// Prefix of the signal strength report.
const RSSI_PREFIX: &str = "^RSSI:";

/// Prefix of the caller ID report.
const CLIP_PREFIX: &str = "+CLIP:";

/// Prefix of the call-end report.
const CEND_PREFIX: &str = "^CEND:";

/// A classified line received from the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemLine {
    /// Received signal strength indicator.
    Rssi(i32),

    /// Caller ID for an incoming call. `None` when the number is hidden.
    CallerId(Option<String>),

    /// The current call ended.
    CallEnded,

    /// Echoes, `OK`, `RING` and unsolicited codes we don't act on.
    Other(String),
}

/// Classify a decoded line.
///
/// A caller number with a leading `0` is a national number and is rewritten
/// with `country_prefix` (`"0401234567"` becomes `"+358401234567"` for
/// `"+358"`). An empty number means the caller withheld it.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] for an `^RSSI:` line whose value is
/// not an integer. Callers log the error and move on to the next line.
pub fn parse_line(line: &str, country_prefix: &str) -> Result<ModemLine> {
    let line = line.trim();

    if let Some(value) = line.strip_prefix(RSSI_PREFIX) {
        return value
            .trim()
            .parse::<i32>()
            .map(ModemLine::Rssi)
            .map_err(|e| ProtocolError::malformed("modem line", format!("{line:?}: {e}")));
    }

    if let Some(rest) = line.strip_prefix(CLIP_PREFIX) {
        let number = rest
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_matches('"')
            .trim();
        return Ok(ModemLine::CallerId(normalize_number(number, country_prefix)));
    }

    if line.starts_with(CEND_PREFIX) {
        return Ok(ModemLine::CallEnded);
    }

    Ok(ModemLine::Other(line.to_string()))
}

fn normalize_number(number: &str, country_prefix: &str) -> Option<String> {
    if number.is_empty() {
        return None;
    }
    match number.strip_prefix('0') {
        Some(national) => Some(format!("{country_prefix}{national}")),
        None => Some(number.to_string()),
    }
}

/// Line codec for the modem control TTY.
///
/// Decodes `\n`-terminated lines with surrounding whitespace (including the
/// `\r` of `\r\n`) removed. Blank lines come out as empty strings, since
/// they still show the modem is alive. Encodes commands with a trailing
/// `\r\n`.
#[derive(Debug, Default)]
pub struct ModemCodec {
    _private: (),
}

impl ModemCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ModemCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_LINE_LENGTH {
                let size = src.len();
                src.clear();
                return Err(ProtocolError::FrameTooLarge {
                    size,
                    max: MAX_LINE_LENGTH,
                });
            }
            return Ok(None);
        };

        let raw = src.split_to(newline + 1);
        Ok(Some(String::from_utf8_lossy(&raw[..newline]).trim().to_string()))
    }
}

impl Encoder<&str> for ModemCodec {
    type Error = ProtocolError;

    fn encode(&mut self, command: &str, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(command.len() + 2);
        dst.put_slice(command.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn decode_all(bytes: &[u8]) -> Vec<String> {
        let mut codec = ModemCodec::new();
        let mut buffer = BytesMut::from(bytes);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(&mut buffer).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[rstest]
    #[case("^RSSI:17", ModemLine::Rssi(17))]
    #[case("^RSSI: 99", ModemLine::Rssi(99))]
    #[case(
        "+CLIP:\"0401234567\",129,,,,0",
        ModemLine::CallerId(Some("+358401234567".to_string()))
    )]
    #[case(
        "+CLIP: \"+46701234567\",145,,,,0",
        ModemLine::CallerId(Some("+46701234567".to_string()))
    )]
    #[case("+CLIP:\"\",128,,,,1", ModemLine::CallerId(None))]
    #[case("^CEND:1,0,104,16", ModemLine::CallEnded)]
    #[case("OK", ModemLine::Other("OK".to_string()))]
    #[case("RING", ModemLine::Other("RING".to_string()))]
    fn test_parse_line(#[case] line: &str, #[case] expected: ModemLine) {
        assert_eq!(parse_line(line, "+358").unwrap(), expected);
    }

    #[test]
    fn test_parse_line_bad_rssi_is_error() {
        let result = parse_line("^RSSI:strong", "+358");
        assert!(matches!(result, Err(ProtocolError::Malformed { .. })));
    }

    #[test]
    fn test_decode_strips_crlf_and_keeps_blank_lines() {
        let lines = decode_all(b"AT\r\r\nOK\r\n\r\n^RSSI:20\r\n");
        assert_eq!(lines, vec!["AT", "OK", "", "^RSSI:20"]);
    }

    #[test]
    fn test_decode_partial_line_waits() {
        let mut codec = ModemCodec::new();
        let mut buffer = BytesMut::from(&b"+CLIP:\"04"[..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"01\",129\r\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap().as_deref(),
            Some("+CLIP:\"0401\",129")
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_oversized_line_is_discarded() {
        let mut codec = ModemCodec::new();
        let mut buffer = BytesMut::from(vec![b'A'; MAX_LINE_LENGTH + 1].as_slice());
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
        assert!(buffer.is_empty());

        buffer.extend_from_slice(b"OK\n");
        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("OK"));
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = ModemCodec::new();
        let mut buffer = BytesMut::new();
        codec.encode("AT+CLIP=1", &mut buffer).unwrap();
        assert_eq!(&buffer[..], b"AT+CLIP=1\r\n");
    }
}
