//! Timing and wire constants shared by the drivers and the orchestrator.
//!
//! Most of these are defaults for values that can be overridden in
//! [`Settings`](crate::Settings). The ones that are not configurable are
//! properties of the attached hardware.
//!
//! # Lock pulse encoding
//!
//! The lock relay is energized while the serial line is clocking out data.
//! Each byte occupies 10 bit times on the wire (start bit, 8 data bits,
//! stop bit), so an unlock of `seconds` at `baud` is encoded as
//! `baud / BITS_PER_BYTE * seconds` filler bytes:
//!
//! ```
//! use latch_core::constants::{BITS_PER_BYTE, DEFAULT_LOCK_BAUD_RATE};
//!
//! let bytes_per_second = DEFAULT_LOCK_BAUD_RATE / BITS_PER_BYTE;
//! assert_eq!(bytes_per_second, 960);
//! ```

use std::time::Duration;

// ============================================================================
// Lock actuator
// ============================================================================

/// Baud rate of the lock relay line.
pub const DEFAULT_LOCK_BAUD_RATE: u32 = 9600;

/// Bit times per transmitted byte (8 data + start + stop).
pub const BITS_PER_BYTE: u32 = 10;

/// Byte clocked out to keep the relay energized (`0b01010101`).
pub const LOCK_FILLER_BYTE: u8 = 0x55;

/// Largest chunk handed to the link in a single write call.
pub const LOCK_WRITE_CHUNK: usize = 1024;

/// Exclusive upper bound for an unlock duration.
///
/// Bounds relay wear and battery draw; `unlock()` rejects anything at or
/// above this value.
pub const MAX_UNLOCK_DURATION: Duration = Duration::from_secs(30);

/// How often the door switch is sampled.
pub const DEFAULT_SENSOR_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default unlock duration for an authorized ring or tag.
pub const DEFAULT_UNLOCK_DURATION: Duration = Duration::from_secs(10);

/// A door held open at least this long is relocked as soon as it closes.
pub const DEFAULT_RELOCK_DEBOUNCE: Duration = Duration::from_secs(3);

// ============================================================================
// Cellular modem
// ============================================================================

/// Baud rate of the modem control TTY.
pub const DEFAULT_MODEM_BAUD_RATE: u32 = 9600;

/// Without a received line for this long the modem is probed (or reopened).
pub const DEFAULT_MODEM_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// A ring with no caller-ID refresh for this long is ended by the watchdog.
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(8);

/// Period of the modem housekeeping tick (probe, reopen, ring watchdog).
pub const MODEM_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Period of the modem read poll.
pub const MODEM_READ_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// Terminal (RFID reader + display + buzzer)
// ============================================================================

/// Baud rate of the terminal link.
pub const DEFAULT_READER_BAUD_RATE: u32 = 115_200;

/// Longest wait for the single response to an outstanding frame.
pub const DEFAULT_READER_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Fixed delay before reopening a failed terminal link.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// The same tag seen again within this window is one presentation.
pub const DEFAULT_TAG_REPEAT_WINDOW: Duration = Duration::from_secs(1);

/// Idle delay before a poll frame is sent when nothing is queued.
pub const READER_IDLE_POLL_DELAY: Duration = Duration::from_millis(20);

/// Display width in pixels.
pub const DISPLAY_WIDTH: usize = 128;

/// Display height in pixels.
pub const DISPLAY_HEIGHT: usize = 64;

/// Size of a packed display frame (1 bit per pixel).
pub const DISPLAY_FRAME_BYTES: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT / 8;

// ============================================================================
// Orchestrator
// ============================================================================

/// Delay between an authorization decision and hanging up the call.
pub const DEFAULT_HANGUP_DELAY: Duration = Duration::from_secs(2);

/// A post-open notice older than this is dropped instead of delivered.
pub const DEFAULT_NOTICE_WINDOW: Duration = Duration::from_secs(30);

/// Delay before a post-open notice is spoken.
pub const NOTICE_SPEECH_DELAY: Duration = Duration::from_secs(3);

/// Seconds in one membership day.
pub const SECONDS_PER_DAY: i64 = 60 * 60 * 24;
