//! ESC/POS command builder
//!
//! Text goes through the windows-1252 encoder as it is written, so the
//! buffer is always ready to send.

use crate::encoding::{encode_latin, latin_width, truncate};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

/// Byte buffer for one receipt
#[derive(Debug, Clone)]
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
}

impl EscPosBuilder {
    /// Builder for `width` columns (32 on 58mm paper, 48 on 80mm)
    pub fn new(width: usize) -> Self {
        let mut buf = Vec::with_capacity(1024);
        buf.extend_from_slice(&[ESC, b'@']);
        // code page 16: WPC1252
        buf.extend_from_slice(&[ESC, b't', 16]);
        Self { buf, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend(encode_latin(s));
        self
    }

    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed `lines` lines
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'd', lines]);
        self
    }

    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'a', 1]);
        self
    }

    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'a', 0]);
        self
    }

    pub fn right(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'a', 2]);
        self
    }

    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'E', 1]);
        self
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'E', 0]);
        self
    }

    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[GS, b'!', 0x11]);
        self
    }

    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[GS, b'!', 0x00]);
        self
    }

    pub fn sep_double(&mut self) -> &mut Self {
        self.line(&"=".repeat(self.width))
    }

    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    /// `left` flush left and `right` flush right on one line
    ///
    /// When both do not fit, `left` is cut so `right` stays whole.
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let rw = latin_width(right);
        let room = self.width.saturating_sub(rw + 1);
        let left = truncate(left, room);
        let gap = self.width.saturating_sub(latin_width(&left) + rw).max(1);
        self.text(&left);
        self.text(&" ".repeat(gap));
        self.line(right)
    }

    /// Feed `lines` then full cut (GS V 66 n)
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[GS, b'V', 0x42, lines]);
        self
    }

    /// Kick pulse on drawer pin 2
    pub fn open_drawer(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'p', 0, 25, 250]);
        self
    }

    /// QR code, model 2, error correction L; `size` is the module size in dots
    pub fn qr_code(&mut self, data: &str, size: u8) -> &mut Self {
        let size = size.clamp(1, 16);
        self.buf
            .extend_from_slice(&[GS, b'(', b'k', 4, 0, 0x31, 0x41, 0x32, 0x00]);
        self.buf
            .extend_from_slice(&[GS, b'(', b'k', 3, 0, 0x31, 0x43, size]);
        self.buf
            .extend_from_slice(&[GS, b'(', b'k', 3, 0, 0x31, 0x45, 0x30]);

        let data = data.as_bytes();
        let len = data.len() + 3;
        self.buf.extend_from_slice(&[
            GS,
            b'(',
            b'k',
            (len & 0xFF) as u8,
            ((len >> 8) & 0xFF) as u8,
            0x31,
            0x50,
            0x30,
        ]);
        self.buf.extend_from_slice(data);
        self.buf
            .extend_from_slice(&[GS, b'(', b'k', 3, 0, 0x31, 0x51, 0x30]);
        self
    }

    /// Bytes written so far, past the init sequence
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= 6
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}
