//! Single-byte text utilities for fiscal and receipt printers
//!
//! Fiscal printers take Latin-1 style text (windows-1252 here). This module
//! provides utilities for:
//! - Transcoding UTF-8 to windows-1252, replacing what cannot be encoded
//! - Folding accents and stripping characters the firmware rejects
//! - Truncating/padding strings to printer column widths

use encoding_rs::{EncoderResult, WINDOWS_1252};

/// Bytes that delimit a frame and must never appear inside a field
const FRAMING_BYTES: [u8; 3] = [0x02, 0x03, 0x1C];

/// Encode text to windows-1252
///
/// Characters outside the charset become `?` rather than failing.
pub fn encode_latin(s: &str) -> Vec<u8> {
    let mut encoder = WINDOWS_1252.new_encoder();
    let mut out = Vec::with_capacity(s.len());
    let mut input = s;

    loop {
        let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(input, &mut out, true);
        input = &input[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => out.reserve(input.len().max(16)),
            EncoderResult::Unmappable(_) => out.push(b'?'),
        }
    }
    out
}

/// Encode a frame field; framing bytes are replaced with `?`
pub fn encode_field(s: &str) -> Vec<u8> {
    let mut bytes = encode_latin(s);
    for b in bytes.iter_mut() {
        if FRAMING_BYTES.contains(b) {
            *b = b'?';
        }
    }
    bytes
}

/// Decode windows-1252 bytes into a String
pub fn decode_latin(bytes: &[u8]) -> String {
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Fold accents and blank out characters fiscal firmware rejects
pub fn format_text(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'ä' => 'a',
            'é' | 'ë' => 'e',
            'í' | 'ï' => 'i',
            'ó' | 'ö' => 'o',
            'ú' | 'ü' => 'u',
            'Á' | 'Ä' => 'A',
            'É' | 'Ë' => 'E',
            'Í' | 'Ï' => 'I',
            'Ó' | 'Ö' => 'O',
            'Ú' | 'Ü' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            '\\' | '\'' | 'º' | '"' | '|' | '¿' | '¡' | 'ª' => ' ',
            other => other,
        })
        .collect()
}

/// Truncate to at most `max` characters
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Characters `start..start + len`, formatted for the printer
pub fn segment(s: &str, start: usize, len: usize) -> String {
    format_text(&s.chars().skip(start).take(len).collect::<String>())
}

/// `format_text` then `truncate`
pub fn fit(s: &str, max: usize) -> String {
    truncate(&format_text(s), max)
}

/// Printed width in columns (one byte per character)
pub fn latin_width(s: &str) -> usize {
    encode_latin(s).len()
}

/// Pad a string to a specific column width
///
/// If the string is longer than the width, it will be truncated.
pub fn pad(s: &str, width: usize, align_right: bool) -> String {
    let current = latin_width(s);
    if current >= width {
        return truncate(s, width);
    }
    let spaces = width - current;
    if align_right {
        format!("{}{}", " ".repeat(spaces), s)
    } else {
        format!("{}{}", s, " ".repeat(spaces))
    }
}
