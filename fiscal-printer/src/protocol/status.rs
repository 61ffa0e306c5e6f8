//! Printer / fiscal status word decoding
//!
//! Every reply starts with two hex status words. Each word is checked
//! against an ordered table and the first matching entry wins, so memory
//! and battery faults always take priority over informational bits.

use crate::error::{PrintError, PrintResult};
use serde::Serialize;
use shared::error::ErrorCode;

/// What a table entry means when its bits are set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Fault(ErrorCode),
    /// Benign state, reported but never raised
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEntry {
    pub mask: u16,
    pub condition: Condition,
    pub message: &'static str,
}

const fn fault(bit: u16, code: ErrorCode, message: &'static str) -> StatusEntry {
    StatusEntry {
        mask: 1 << bit,
        condition: Condition::Fault(code),
        message,
    }
}

const fn notice(bit: u16, message: &'static str) -> StatusEntry {
    StatusEntry {
        mask: 1 << bit,
        condition: Condition::Notice,
        message,
    }
}

/// Bit 13 of the fiscal word: a document is open
pub const FISCAL_DOCUMENT_OPEN: u16 = 1 << 13;

const FISCAL_ENTRIES: &[StatusEntry] = &[
    fault(0, ErrorCode::FiscalMemoryError, "Fiscal memory error"),
    fault(1, ErrorCode::WorkingMemoryError, "Working memory check error"),
    fault(2, ErrorCode::LowBattery, "Low battery"),
    fault(3, ErrorCode::UnknownCommand, "Command not recognized"),
    fault(4, ErrorCode::InvalidDataField, "Invalid data field"),
    fault(5, ErrorCode::InvalidFiscalState, "Command not valid for the fiscal state"),
    fault(6, ErrorCode::TotalsOverflow, "Totals overflow"),
    fault(7, ErrorCode::FiscalMemoryFull, "Fiscal memory full"),
    fault(8, ErrorCode::FiscalMemoryAlmostFull, "Fiscal memory almost full"),
    fault(
        11,
        ErrorCode::DailyCloseRequired,
        "Daily close required or maximum tickets per bill exceeded",
    ),
    notice(12, "fiscal document open"),
    notice(13, "document open"),
];

const EPSON_PRINTER_ENTRIES: &[StatusEntry] = &[
    fault(2, ErrorCode::PrinterFault, "Printer error or fault"),
    fault(3, ErrorCode::PrinterOffline, "Printer offline"),
    fault(6, ErrorCode::PrinterBufferFull, "Printer buffer full"),
    fault(14, ErrorCode::OutOfPaper, "Printer out of paper"),
];

const HASAR_PRINTER_ENTRIES: &[StatusEntry] = &[
    fault(2, ErrorCode::PrinterFault, "Printer error or fault"),
    fault(3, ErrorCode::PrinterOffline, "Printer offline"),
    fault(6, ErrorCode::PrinterBufferFull, "Printer buffer full"),
    fault(8, ErrorCode::CoverOpen, "Printer cover open"),
];

/// Ordered tables for one printer family
#[derive(Debug, Clone, Copy)]
pub struct StatusTable {
    pub printer: &'static [StatusEntry],
    pub fiscal: &'static [StatusEntry],
}

pub const EPSON: StatusTable = StatusTable {
    printer: EPSON_PRINTER_ENTRIES,
    fiscal: FISCAL_ENTRIES,
};

pub const HASAR: StatusTable = StatusTable {
    printer: HASAR_PRINTER_ENTRIES,
    fiscal: FISCAL_ENTRIES,
};

/// Status words carried no fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Clean {
    pub notice: Option<&'static str>,
}

fn first_match(entries: &[StatusEntry], word: u16) -> Option<&StatusEntry> {
    entries.iter().find(|e| word & e.mask == e.mask)
}

impl StatusTable {
    /// Printer word is checked before the fiscal word
    pub fn decode(&self, printer: u16, fiscal: u16) -> PrintResult<Clean> {
        let mut clean = Clean::default();

        if let Some(entry) = first_match(self.printer, printer) {
            match entry.condition {
                Condition::Fault(code) => {
                    return Err(PrintError::PrinterStatus {
                        code,
                        message: entry.message.to_string(),
                    });
                }
                Condition::Notice => clean.notice = Some(entry.message),
            }
        }

        if let Some(entry) = first_match(self.fiscal, fiscal) {
            match entry.condition {
                Condition::Fault(code) => {
                    return Err(PrintError::FiscalStatus {
                        code,
                        message: entry.message.to_string(),
                    });
                }
                Condition::Notice => {
                    clean.notice.get_or_insert(entry.message);
                }
            }
        }

        Ok(clean)
    }
}

/// Parse a hex status field
pub fn parse_word(field: &str) -> PrintResult<u16> {
    u16::from_str_radix(field.trim(), 16)
        .map_err(|_| PrintError::MalformedReply(format!("invalid status word '{}'", field)))
}

/// Non-fatal printer conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    LowAuditPaper,
    LowTicketPaper,
}

impl Warning {
    pub fn message(&self) -> &'static str {
        match self {
            Warning::LowAuditPaper => "Low paper for the audit tape",
            Warning::LowTicketPaper => "Low paper for receipts or tickets",
        }
    }
}

/// Extract warnings from the printer word without raising
pub fn warnings(printer: u16) -> Vec<Warning> {
    let mut out = Vec::new();
    if printer & (1 << 4) != 0 {
        out.push(Warning::LowAuditPaper);
    }
    if printer & (1 << 5) != 0 {
        out.push(Warning::LowTicketPaper);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_words() {
        assert_eq!(EPSON.decode(0, 0).unwrap(), Clean::default());
        assert_eq!(HASAR.decode(0x0030, 0).unwrap(), Clean::default());
    }

    #[test]
    fn test_memory_full_beats_document_open() {
        let fiscal = (1 << 7) | FISCAL_DOCUMENT_OPEN;
        let err = EPSON.decode(0, fiscal).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FiscalMemoryFull);
    }

    #[test]
    fn test_first_match_in_table_order() {
        // memory error (bit 0) listed before memory full (bit 7)
        let err = HASAR.decode(0, 0x0081).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FiscalMemoryError);
    }

    #[test]
    fn test_printer_word_checked_first() {
        let err = HASAR.decode(1 << 8, 1 << 7).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CoverOpen);
    }

    #[test]
    fn test_brand_specific_printer_bits() {
        assert_eq!(
            EPSON.decode(1 << 14, 0).unwrap_err().code(),
            ErrorCode::OutOfPaper
        );
        // bit 8 is not a fault for Epson
        assert!(EPSON.decode(1 << 8, 0).is_ok());
        assert!(HASAR.decode(1 << 14, 0).is_ok());
    }

    #[test]
    fn test_notice_is_clean() {
        let clean = EPSON.decode(0, FISCAL_DOCUMENT_OPEN).unwrap();
        assert_eq!(clean.notice, Some("document open"));
        let clean = EPSON.decode(0, 1 << 12 | FISCAL_DOCUMENT_OPEN).unwrap();
        assert_eq!(clean.notice, Some("fiscal document open"));
    }

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("0600").unwrap(), 0x0600);
        assert_eq!(parse_word("00").unwrap(), 0);
        assert!(matches!(
            parse_word("zz"),
            Err(PrintError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_warnings() {
        assert!(warnings(0).is_empty());
        assert_eq!(
            warnings(0x0030),
            vec![Warning::LowAuditPaper, Warning::LowTicketPaper]
        );
        assert_eq!(warnings(1 << 5), vec![Warning::LowTicketPaper]);
    }
}
