//! Monochrome framebuffer for the terminal display.
//!
//! The display is 128x64 pixels. Frames are stored in the display's native
//! layout so [`Bitmap::as_bytes`] is the draw payload without conversion:
//! eight horizontal bands of eight rows, each band 128 bytes wide (one byte
//! per column), with the band's top row in bit 0.

use latch_core::constants::{DISPLAY_FRAME_BYTES, DISPLAY_HEIGHT, DISPLAY_WIDTH};

use crate::font::{GLYPH_ADVANCE, GLYPH_HEIGHT, glyph};

const WIDTH: i32 = DISPLAY_WIDTH as i32;
const HEIGHT: i32 = DISPLAY_HEIGHT as i32;

/// Built-in 16x16 icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    /// Closed padlock.
    Locked,
    /// Open padlock.
    Unlocked,
    /// Doorbell.
    Bell,
    /// Telephone handset.
    Phone,
    /// RFID card.
    Tag,
    /// Circled cross.
    Error,
    /// Circled question mark.
    Unknown,
}

impl Icon {
    /// Icon edge length in pixels, before scaling.
    pub const SIZE: usize = 16;

    #[rustfmt::skip]
    fn rows(self) -> &'static [u16; Self::SIZE] {
        match self {
            Icon::Locked => &[
                0b0000_0111_1110_0000,
                0b0000_1100_0011_0000,
                0b0001_1000_0001_1000,
                0b0001_0000_0000_1000,
                0b0001_0000_0000_1000,
                0b0001_0000_0000_1000,
                0b0111_1111_1111_1110,
                0b0111_1111_1111_1110,
                0b0111_1110_0111_1110,
                0b0111_1100_0011_1110,
                0b0111_1110_0111_1110,
                0b0111_1110_0111_1110,
                0b0111_1111_1111_1110,
                0b0111_1111_1111_1110,
                0, 0,
            ],
            Icon::Unlocked => &[
                0b0000_0111_1110_0000,
                0b0000_1100_0011_0000,
                0b0001_1000_0001_1000,
                0b0001_0000_0000_1000,
                0b0001_0000_0000_1000,
                0b0000_0000_0000_1000,
                0b0111_1111_1111_1110,
                0b0111_1111_1111_1110,
                0b0111_1110_0111_1110,
                0b0111_1100_0011_1110,
                0b0111_1110_0111_1110,
                0b0111_1110_0111_1110,
                0b0111_1111_1111_1110,
                0b0111_1111_1111_1110,
                0, 0,
            ],
            Icon::Bell => &[
                0b0000_0001_1000_0000,
                0b0000_0111_1110_0000,
                0b0000_1111_1111_0000,
                0b0001_1111_1111_1000,
                0b0001_1111_1111_1000,
                0b0001_1111_1111_1000,
                0b0001_1111_1111_1000,
                0b0011_1111_1111_1100,
                0b0011_1111_1111_1100,
                0b0111_1111_1111_1110,
                0b1111_1111_1111_1111,
                0b1111_1111_1111_1111,
                0,
                0b0000_0011_1100_0000,
                0b0000_0001_1000_0000,
                0,
            ],
            Icon::Phone => &[
                0b0011_1000_0000_0000,
                0b0111_1100_0000_0000,
                0b0111_1100_0000_0000,
                0b0111_1000_0000_0000,
                0b0111_0000_0000_0000,
                0b0111_0000_0000_0000,
                0b0011_1000_0000_0000,
                0b0011_1000_0000_0000,
                0b0001_1100_0000_0000,
                0b0000_1110_0001_1100,
                0b0000_0111_0011_1110,
                0b0000_0011_1111_1110,
                0b0000_0001_1111_1100,
                0b0000_0000_1111_1000,
                0, 0,
            ],
            Icon::Tag => &[
                0,
                0b0011_1111_1111_1100,
                0b0110_0000_0000_0110,
                0b0100_0000_0000_0010,
                0b0100_0110_0000_0010,
                0b0100_0110_0000_0010,
                0b0100_0000_0000_0010,
                0b0100_0000_0000_0010,
                0b0100_0011_1111_0010,
                0b0100_0000_0000_0010,
                0b0100_0011_1100_0010,
                0b0100_0000_0000_0010,
                0b0110_0000_0000_0110,
                0b0011_1111_1111_1100,
                0, 0,
            ],
            Icon::Error => &[
                0b0000_0111_1110_0000,
                0b0001_1000_0001_1000,
                0b0010_0000_0000_0100,
                0b0100_1000_0001_0010,
                0b0100_0100_0010_0010,
                0b1000_0010_0100_0001,
                0b1000_0001_1000_0001,
                0b1000_0001_1000_0001,
                0b1000_0010_0100_0001,
                0b0100_0100_0010_0010,
                0b0100_1000_0001_0010,
                0b0010_0000_0000_0100,
                0b0001_1000_0001_1000,
                0b0000_0111_1110_0000,
                0, 0,
            ],
            Icon::Unknown => &[
                0b0000_0111_1110_0000,
                0b0001_1000_0001_1000,
                0b0010_0011_1100_0100,
                0b0100_0110_0110_0010,
                0b0100_0000_0110_0010,
                0b1000_0000_1100_0001,
                0b1000_0001_1000_0001,
                0b1000_0001_1000_0001,
                0b1000_0000_0000_0001,
                0b0100_0001_1000_0010,
                0b0100_0001_1000_0010,
                0b0010_0000_0000_0100,
                0b0001_1000_0001_1000,
                0b0000_0111_1110_0000,
                0, 0,
            ],
        }
    }
}

/// A 128x64 one-bit framebuffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    data: Box<[u8; DISPLAY_FRAME_BYTES]>,
}

impl Bitmap {
    /// Width in pixels.
    pub const WIDTH: usize = DISPLAY_WIDTH;

    /// Height in pixels.
    pub const HEIGHT: usize = DISPLAY_HEIGHT;

    /// A blank (all pixels off) frame.
    pub fn new() -> Self {
        Self {
            data: Box::new([0; DISPLAY_FRAME_BYTES]),
        }
    }

    /// Rebuild a frame from its wire payload.
    ///
    /// Returns `None` unless `bytes` is exactly one frame long.
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        let data: [u8; DISPLAY_FRAME_BYTES] = bytes.try_into().ok()?;
        Some(Self {
            data: Box::new(data),
        })
    }

    /// Wire payload of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..]
    }

    /// Check whether every pixel is off.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    fn index(x: i32, y: i32) -> Option<(usize, u8)> {
        if !(0..WIDTH).contains(&x) || !(0..HEIGHT).contains(&y) {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        Some(((y / 8) * DISPLAY_WIDTH + x, 1 << (y % 8)))
    }

    /// Read a pixel; pixels outside the display read as off.
    pub fn pixel(&self, x: i32, y: i32) -> bool {
        Self::index(x, y).is_some_and(|(i, mask)| self.data[i] & mask != 0)
    }

    /// Set or clear a pixel. Out-of-bounds writes are clipped.
    pub fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        if let Some((i, mask)) = Self::index(x, y) {
            if on {
                self.data[i] |= mask;
            } else {
                self.data[i] &= !mask;
            }
        }
    }

    /// Fill the rectangle between two corners, both inclusive.
    pub fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, on: bool) {
        let (x0, x1) = (x0.min(x1).max(0), x0.max(x1).min(WIDTH - 1));
        let (y0, y1) = (y0.min(y1).max(0), y0.max(y1).min(HEIGHT - 1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set_pixel(x, y, on);
            }
        }
    }

    /// Draw a one pixel wide rectangle outline, corners inclusive.
    pub fn outline_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        for x in x0.min(x1)..=x0.max(x1) {
            self.set_pixel(x, y0, true);
            self.set_pixel(x, y1, true);
        }
        for y in y0.min(y1)..=y0.max(y1) {
            self.set_pixel(x0, y, true);
            self.set_pixel(x1, y, true);
        }
    }

    /// Pixel width of `text` rendered at `scale`.
    pub fn text_width(text: &str, scale: usize) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        (chars * GLYPH_ADVANCE - 1) * scale.max(1)
    }

    /// Pixel height of one line of text at `scale`.
    pub fn line_height(scale: usize) -> usize {
        (GLYPH_HEIGHT + 1) * scale.max(1)
    }

    /// Render `text` with its top-left corner at `(x, y)`.
    ///
    /// `on` selects the ink: `false` draws dark text, used over a filled
    /// background. A `\n` starts a new line at `x`. Returns the x coordinate
    /// just past the widest line.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, scale: usize, on: bool) -> i32 {
        let scale = scale.max(1) as i32;
        let advance = GLYPH_ADVANCE as i32 * scale;
        let line_height = Self::line_height(scale as usize) as i32;
        let mut cursor_x = x;
        let mut cursor_y = y;
        let mut right = x;

        for c in text.chars() {
            if c == '\n' {
                cursor_x = x;
                cursor_y += line_height;
                continue;
            }
            for (col, bits) in glyph(c).iter().enumerate() {
                for row in 0..GLYPH_HEIGHT {
                    if bits & (1 << row) != 0 {
                        let px = cursor_x + col as i32 * scale;
                        let py = cursor_y + row as i32 * scale;
                        self.fill_rect(px, py, px + scale - 1, py + scale - 1, on);
                    }
                }
            }
            cursor_x += advance;
            right = right.max(cursor_x - scale);
        }
        right
    }

    /// Draw `icon` with its top-left corner at `(x, y)`, each icon pixel
    /// rendered as a `scale` x `scale` block.
    pub fn draw_icon(&mut self, icon: Icon, x: i32, y: i32, scale: usize) {
        let scale = scale.max(1) as i32;
        for (row, bits) in icon.rows().iter().enumerate() {
            for col in 0..Icon::SIZE {
                if bits & (0x8000 >> col) != 0 {
                    let px = x + col as i32 * scale;
                    let py = y + row as i32 * scale;
                    self.fill_rect(px, py, px + scale - 1, py + scale - 1, true);
                }
            }
        }
    }

    /// Draw a horizontal progress bar spanning the full width between rows
    /// `y0` and `y1`, filled to `fraction` (clamped to `0.0..=1.0`).
    pub fn progress_bar(&mut self, y0: i32, y1: i32, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let filled = (fraction * f64::from(WIDTH)) as i32;
        if filled > 0 {
            self.fill_rect(0, y0, filled - 1, y1, true);
        }
        self.outline_rect(0, y0, WIDTH - 1, y1);
    }

    /// Render the frame as Unicode braille, 2x4 pixels per character, inside
    /// a box. Used to show the display in simulation logs.
    pub fn to_braille(&self) -> String {
        const DOTS: [(i32, i32); 8] = [
            (0, 0),
            (0, 1),
            (0, 2),
            (1, 0),
            (1, 1),
            (1, 2),
            (0, 3),
            (1, 3),
        ];
        let columns = DISPLAY_WIDTH / 2;
        let mut out = String::with_capacity((columns + 3) * (DISPLAY_HEIGHT / 4 + 2) * 3);

        out.push('┌');
        out.extend(std::iter::repeat_n('─', columns));
        out.push_str("┐\n");
        for cy in (0..HEIGHT).step_by(4) {
            out.push('│');
            for cx in (0..WIDTH).step_by(2) {
                let mut cell = 0u32;
                for (bit, (dx, dy)) in DOTS.iter().enumerate() {
                    if self.pixel(cx + dx, cy + dy) {
                        cell |= 1 << bit;
                    }
                }
                out.push(char::from_u32(0x2800 + cell).unwrap_or(' '));
            }
            out.push_str("│\n");
        }
        out.push('└');
        out.extend(std::iter::repeat_n('─', columns));
        out.push('┘');
        out
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.data.iter().map(|b| b.count_ones()).sum::<u32>();
        f.debug_struct("Bitmap").field("lit_pixels", &lit).finish()
    }
}
