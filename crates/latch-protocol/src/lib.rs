//! Wire protocols spoken by the door hardware.
//!
//! - [`modem`]: AT command lines exchanged with the cellular modem.
//! - [`terminal`]: tagged, escaped, newline-terminated frames exchanged with
//!   the RFID reader terminal.
//! - [`note`]: buzzer notes and the MML melody notation used to author them.
//! - [`bitmap`]: the 128x64 monochrome framebuffer shown on the terminal.
//!
//! Both line protocols are exposed as `tokio_util` codecs. The drivers feed
//! them from non-blocking serial reads rather than through `Framed`, since
//! the serial links are polled.

pub mod bitmap;
pub mod error;
mod font;
pub mod modem;
pub mod note;
pub mod terminal;

pub use bitmap::{Bitmap, Icon};
pub use error::{ProtocolError, Result};
pub use modem::{ModemCodec, ModemLine, parse_line};
pub use note::{Note, parse_mml};
pub use terminal::{CommandKind, ReaderCommand, ReaderFrame, TerminalCodec};
