//! Fiscal frame codec
//!
//! ```text
//! STX SEQ CMD [FS field]* ETX CK CK CK CK
//! ```
//!
//! The checksum is the sum of every byte from STX through ETX inclusive,
//! modulo 0x10000, rendered as four uppercase hex digits.

use crate::encoding::{decode_latin, encode_field};
use crate::error::{PrintError, PrintResult};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const DC2: u8 = 0x12;
pub const DC4: u8 = 0x14;
pub const FS: u8 = 0x1C;
/// Field value that clears a header/trailer line
pub const DEL: u8 = 0x7F;

/// Decoded reply frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u8,
    pub command: u8,
    pub fields: Vec<String>,
    /// Bytes between CMD and ETX
    pub body: Vec<u8>,
}

/// Additive checksum over `bytes`
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

fn checksum_hex(bytes: &[u8]) -> [u8; 4] {
    let hex = format!("{:04X}", checksum(bytes));
    let mut out = [0u8; 4];
    out.copy_from_slice(hex.as_bytes());
    out
}

/// Build an outgoing frame
pub fn encode<S: AsRef<str>>(sequence: u8, command: u8, fields: &[S]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + fields.iter().map(|f| f.as_ref().len() + 1).sum::<usize>());
    frame.push(STX);
    frame.push(sequence);
    frame.push(command);
    for field in fields {
        frame.push(FS);
        frame.extend_from_slice(&encode_field(field.as_ref()));
    }
    frame.push(ETX);
    let ck = checksum_hex(&frame);
    frame.extend_from_slice(&ck);
    frame
}

/// Decode a complete frame (STX through the four checksum digits)
pub fn decode(bytes: &[u8]) -> PrintResult<Frame> {
    if bytes.first() != Some(&STX) {
        return Err(PrintError::MalformedReply("frame does not start with STX".into()));
    }
    let etx = bytes
        .iter()
        .position(|&b| b == ETX)
        .ok_or(PrintError::TruncatedFrame)?;
    if etx < 3 || bytes.len() < etx + 5 {
        return Err(PrintError::TruncatedFrame);
    }

    let expected = checksum_hex(&bytes[..=etx]);
    let received = &bytes[etx + 1..etx + 5];
    if !expected.eq_ignore_ascii_case(received) {
        return Err(PrintError::BadChecksum);
    }

    let body = bytes[3..etx].to_vec();
    let fields = match body.split_first() {
        Some((&FS, rest)) => rest.split(|&b| b == FS).map(decode_latin).collect(),
        Some(_) => vec![decode_latin(&body)],
        None => Vec::new(),
    };

    Ok(Frame {
        sequence: bytes[1],
        command: bytes[2],
        fields,
        body,
    })
}

/// Render bytes as hex for trace logging
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
