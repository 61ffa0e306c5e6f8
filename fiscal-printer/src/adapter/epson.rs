//! Epson fiscal command set
//!
//! Tickets, bills and credit notes each have their own opcode for item,
//! subtotal, payment and close; the open document picks the set.

use super::tables::epson::{doc_type_name, iva_code};
use super::{
    Capability, ClosureKind, ClosureReport, CommandAdapter, DeviceStatus, Recovery, RecoveryStep,
    document_mut, ensure_closed, run_recovery, strings,
};
use crate::document::{
    Additional, Customer, Document, DocumentHeader, DocumentType, Item, Payment, clean_doc_number,
};
use crate::encoding::{fit, segment};
use crate::error::{PrintError, PrintResult};
use crate::link::{FiscalLink, Reply};
use crate::money::{cents, fixed, net_of_vat, round_cents, scaled, to_decimal};
use crate::protocol::frame::DEL;
use crate::protocol::status::EPSON;
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

const CMD_STATUS_REQUEST: u8 = 0x2a;
const CMD_DAILY_CLOSE: u8 = 0x39;
const CMD_OPEN_FISCAL_RECEIPT: u8 = 0x40;
const CMD_PRINT_TEXT_IN_FISCAL: u8 = 0x41;
const CMD_OPEN_NON_FISCAL_RECEIPT: u8 = 0x48;
const CMD_PRINT_NON_FISCAL_TEXT: u8 = 0x49;
const CMD_CLOSE_NON_FISCAL_RECEIPT: u8 = 0x4a;
const CMD_SET_HEADER_TRAILER: u8 = 0x5d;
const CMD_OPEN_BILL_TICKET: u8 = 0x60;
const CMD_OPEN_DRAWER: u8 = 0x7b;

/// (ticket, bill) opcodes
const CMD_PRINT_LINE_ITEM: [u8; 2] = [0x42, 0x62];
const CMD_ADD_PAYMENT: [u8; 2] = [0x44, 0x64];
const CMD_CLOSE_FISCAL_RECEIPT: [u8; 2] = [0x45, 0x65];

const ADDRESS_SIZE: usize = 30;
const DESCRIPTION_SIZE: usize = 20;

const HEADER_LINES: std::ops::Range<u8> = 3..6;
const TRAILER_LINES: std::ops::Range<u8> = 11..20;

const RECOVERY: &[RecoveryStep] = &[
    RecoveryStep {
        name: "cancel_ticket",
        command: CMD_ADD_PAYMENT[0],
        fields: &["Cancelar", "0", "C"],
    },
    RecoveryStep {
        name: "cancel_bill",
        command: CMD_ADD_PAYMENT[1],
        fields: &["Cancelar", "0", "C"],
    },
    RecoveryStep {
        name: "close_non_fiscal",
        command: CMD_CLOSE_NON_FISCAL_RECEIPT,
        fields: &["T"],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpsonModel {
    /// TM-U220AF, TM-300AF and other ticket printers
    #[default]
    Tickeadora,
    /// LX-300+, slip printer that only prints bills
    Lx300Plus,
    Tm220Af,
    TmT900Fa,
}

/// How a letter A unit price (net of VAT) is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetPriceFormat {
    /// "%0.4f" of the net price
    FourDecimals,
    /// Integer cents of the net price
    Cents,
}

impl EpsonModel {
    pub fn from_key(key: &str) -> PrintResult<Self> {
        match key {
            "" | "tickeadoras" | "tickeadora" => Ok(EpsonModel::Tickeadora),
            "epsonlx300+" | "lx300+" => Ok(EpsonModel::Lx300Plus),
            "tm-220-af" => Ok(EpsonModel::Tm220Af),
            "tm-t900fa" => Ok(EpsonModel::TmT900Fa),
            other => Err(PrintError::UnsupportedModel(format!("epson {}", other))),
        }
    }

    pub fn net_price_format(&self) -> NetPriceFormat {
        match self {
            EpsonModel::Tm220Af | EpsonModel::TmT900Fa => NetPriceFormat::FourDecimals,
            EpsonModel::Tickeadora | EpsonModel::Lx300Plus => NetPriceFormat::Cents,
        }
    }

    fn is_slip(&self) -> bool {
        matches!(self, EpsonModel::Lx300Plus)
    }
}

/// Opcode family of the open document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandSet {
    Ticket,
    Bill,
    NonFiscal,
}

impl CommandSet {
    fn index(&self) -> PrintResult<usize> {
        match self {
            CommandSet::Ticket => Ok(0),
            CommandSet::Bill => Ok(1),
            CommandSet::NonFiscal => Err(PrintError::DocumentState(
                "not allowed on a non-fiscal document".into(),
            )),
        }
    }
}

#[derive(Debug)]
pub struct EpsonAdapter {
    link: Box<dyn FiscalLink>,
    model: EpsonModel,
    document: Option<Document>,
    set: CommandSet,
}

impl EpsonAdapter {
    pub fn new(link: Box<dyn FiscalLink>, model: EpsonModel) -> Self {
        Self {
            link,
            model,
            document: None,
            set: CommandSet::Ticket,
        }
    }

    pub fn model(&self) -> EpsonModel {
        self.model
    }

    async fn send(&mut self, command: u8, fields: Vec<String>, skip_status: bool) -> PrintResult<Reply> {
        self.link.send_command(command, &fields, skip_status).await
    }

    /// Command set and letter of the open document
    fn open_context(&mut self) -> PrintResult<(CommandSet, Option<char>)> {
        let doc = document_mut(&mut self.document)?;
        Ok((self.set, doc.letter()))
    }

    fn bill_fields(&self, letter: char, customer: &Customer, credit_note: bool) -> Vec<String> {
        let doc_number = clean_doc_number(customer.doc_number.trim());
        let (doc_name, doc_number) = if doc_number.is_empty() {
            (String::new(), String::new())
        } else {
            (doc_type_name(customer.doc_type).to_string(), doc_number)
        };
        let mandatory = |value: String| {
            if value.is_empty() && credit_note {
                "-".to_string()
            } else {
                value
            }
        };

        let iva = iva_code(customer.iva_type);
        let (kind, training) = match (self.model.is_slip(), credit_note) {
            (true, true) => ("N", "I"),
            (true, false) => ("F", "I"),
            (false, true) => ("M", "E"),
            (false, false) => ("T", "E"),
        };
        let address = &customer.address;
        let first_address = segment(address, 0, ADDRESS_SIZE);

        vec![
            kind.to_string(),
            "C".to_string(),
            letter.to_string(),
            "1".to_string(),
            "P".to_string(),
            "17".to_string(),
            training.to_string(),
            iva.to_string(),
            segment(&customer.name, 0, 40),
            segment(&customer.name, 40, 40),
            mandatory(doc_name),
            mandatory(doc_number),
            "N".to_string(),
            if first_address.is_empty() { "-".to_string() } else { first_address },
            segment(address, ADDRESS_SIZE, ADDRESS_SIZE),
            segment(address, ADDRESS_SIZE * 2, ADDRESS_SIZE),
            if credit_note || iva != "F" { "-" } else { "" }.to_string(),
            String::new(),
            "C".to_string(),
        ]
    }

    fn unit_price(&self, price: f64, tax_rate: f64, letter: Option<char>) -> String {
        if letter != Some('A') {
            return fixed(to_decimal(price), 4);
        }
        match self.model.net_price_format() {
            NetPriceFormat::FourDecimals => fixed(net_of_vat(price, tax_rate), 4),
            NetPriceFormat::Cents => cents(net_of_vat(price, tax_rate)).to_string(),
        }
    }

    fn extra_fields(set: CommandSet) -> Vec<String> {
        if set == CommandSet::Bill {
            vec![String::new(); 3]
        } else {
            Vec::new()
        }
    }

    async fn set_lines(&mut self, lines: &[String], range: std::ops::Range<u8>) -> PrintResult<()> {
        let clear = char::from(DEL).to_string();
        for (i, line) in range.enumerate() {
            let text = lines.get(i).cloned().unwrap_or_else(|| clear.clone());
            self.send(CMD_SET_HEADER_TRAILER, vec![line.to_string(), text], false)
                .await?;
        }
        Ok(())
    }

    /// Status request with the documented single retry on short replies
    async fn status_reply(&mut self, kind: &str) -> PrintResult<Reply> {
        let reply = self.send(CMD_STATUS_REQUEST, strings(&[kind]), true).await?;
        if reply.len() < 3 {
            return self.send(CMD_STATUS_REQUEST, strings(&[kind]), false).await;
        }
        Ok(reply)
    }
}

#[async_trait]
impl CommandAdapter for EpsonAdapter {
    fn capability(&self) -> Capability {
        Capability::Fiscal
    }

    fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    #[instrument(skip(self, header), fields(doc_type = ?header.doc_type))]
    async fn open_document(&mut self, mut header: DocumentHeader) -> PrintResult<()> {
        ensure_closed(&self.document)?;

        // the slip model prints every ticket as a final consumer bill
        let ticket_as_bill = header.doc_type == DocumentType::Ticket && self.model.is_slip();
        if ticket_as_bill {
            header.letter = Some(header.letter.unwrap_or('B'));
            header.customer = Customer {
                name: "CONSUMIDOR FINAL".into(),
                ..Customer::final_consumer()
            };
        }
        let doc = Document::open(header)?;

        let set = match doc.doc_type() {
            DocumentType::Ticket if !ticket_as_bill => {
                self.send(CMD_OPEN_FISCAL_RECEIPT, strings(&["C"]), false)
                    .await?;
                CommandSet::Ticket
            }
            DocumentType::Ticket | DocumentType::Bill | DocumentType::CreditNote => {
                let letter = doc.letter().unwrap_or('B');
                let credit_note = doc.doc_type() == DocumentType::CreditNote;
                let fields = self.bill_fields(letter, &doc.header().customer, credit_note);
                self.send(CMD_OPEN_BILL_TICKET, fields, false).await?;
                CommandSet::Bill
            }
            DocumentType::NonFiscal => {
                self.send(CMD_OPEN_NON_FISCAL_RECEIPT, Vec::new(), false)
                    .await?;
                CommandSet::NonFiscal
            }
            other => {
                return Err(PrintError::Unsupported(format!(
                    "{:?} documents on Epson printers",
                    other
                )));
            }
        };

        debug!(?set, "Document opened");
        self.set = set;
        self.document = Some(doc);
        Ok(())
    }

    async fn add_item(&mut self, item: Item) -> PrintResult<()> {
        let (set, letter) = self.open_context()?;
        let index = set.index()?;
        item.validate()?;

        let quantity = scaled(item.quantity, 1000).to_string();
        let bultos = if self.model.is_slip() {
            scaled(item.quantity, 1).to_string()
        } else {
            "0".repeat(5)
        };
        let price = self.unit_price(item.unit_price, item.tax_rate, letter);
        let iva = scaled(item.tax_rate, 100).to_string();
        let sign = if item.negative { "R" } else { "M" };

        if set == CommandSet::Ticket {
            for line in item.leading_lines() {
                self.send(CMD_PRINT_TEXT_IN_FISCAL, vec![fit(line, DESCRIPTION_SIZE)], false)
                    .await?;
            }
        }

        let mut fields = vec![
            fit(item.line(), DESCRIPTION_SIZE),
            quantity,
            price,
            iva.clone(),
            sign.to_string(),
            bultos,
            "0".repeat(8),
        ];
        fields.extend(Self::extra_fields(set));
        self.send(CMD_PRINT_LINE_ITEM[index], fields, false).await?;

        if let Some(discount) = item.discount.as_ref().filter(|d| d.amount != 0.0) {
            let mut fields = vec![
                fit(&discount.description, DESCRIPTION_SIZE),
                "1000".to_string(),
                scaled(discount.amount, 100).to_string(),
                iva,
                "R".to_string(),
                "0".to_string(),
                "0".to_string(),
            ];
            fields.extend(Self::extra_fields(set));
            self.send(CMD_PRINT_LINE_ITEM[index], fields, false).await?;
        }

        document_mut(&mut self.document)?.add_item(item)
    }

    async fn add_payment(&mut self, payment: Payment) -> PrintResult<()> {
        let (set, _) = self.open_context()?;
        let index = set.index()?;
        let fields = vec![
            fit(&payment.description, DESCRIPTION_SIZE),
            scaled(payment.amount, 100).to_string(),
            "T".to_string(),
        ];
        self.send(CMD_ADD_PAYMENT[index], fields, false).await?;
        document_mut(&mut self.document)?.add_payment(payment)
    }

    async fn add_additional_charge(&mut self, additional: Additional) -> PrintResult<()> {
        let (set, letter) = self.open_context()?;
        let index = set.index()?;

        let (default_description, sign) = if additional.is_discount {
            ("Descuento", "R")
        } else {
            ("Recargo", "M")
        };
        let description = if additional.description.is_empty() {
            default_description
        } else {
            additional.description.as_str()
        };
        let amount = if letter == Some('A') {
            cents(net_of_vat(additional.amount, additional.tax_rate))
        } else {
            round_cents(additional.amount)
        };

        let mut fields = vec![
            fit(description, DESCRIPTION_SIZE),
            "1000".to_string(),
            amount.to_string(),
            scaled(additional.tax_rate, 100).to_string(),
            sign.to_string(),
            "0".to_string(),
            "0".to_string(),
        ];
        fields.extend(Self::extra_fields(set));
        self.send(CMD_PRINT_LINE_ITEM[index], fields, false).await?;
        document_mut(&mut self.document)?.add_additional(additional)
    }

    #[instrument(skip(self))]
    async fn close_document(&mut self) -> PrintResult<String> {
        let (set, letter) = match self.open_context() {
            Ok(ctx) => ctx,
            Err(_) => {
                // nothing open here; report what the device last closed
                let (doc_type, letter) = self
                    .document
                    .as_ref()
                    .map(|d| (d.doc_type(), d.letter()))
                    .unwrap_or((DocumentType::Ticket, None));
                warn!("Close requested with no open document, re-syncing with the device");
                return self.last_number(doc_type, letter).await.map(|n| n.to_string());
            }
        };
        let letter = letter.unwrap_or('B').to_string();
        let credit_note = self
            .document
            .as_ref()
            .is_some_and(|d| d.doc_type() == DocumentType::CreditNote);

        let number = match set {
            CommandSet::Ticket => {
                let reply = self
                    .send(CMD_CLOSE_FISCAL_RECEIPT[0], strings(&["T"]), false)
                    .await?;
                reply.required(2)?.to_string()
            }
            CommandSet::Bill => {
                let kind = match (self.model.is_slip(), credit_note) {
                    (true, true) => "N",
                    (true, false) => "F",
                    (false, true) => "M",
                    (false, false) => "T",
                };
                let reply = self
                    .send(
                        CMD_CLOSE_FISCAL_RECEIPT[1],
                        vec![kind.to_string(), letter, "FINAL".to_string()],
                        false,
                    )
                    .await?;
                reply.required(2)?.to_string()
            }
            CommandSet::NonFiscal => {
                let reply = self
                    .send(CMD_CLOSE_NON_FISCAL_RECEIPT, strings(&["T"]), true)
                    .await?;
                reply.field(2).unwrap_or_default().to_string()
            }
        };

        document_mut(&mut self.document)?.close()?;
        info!(number = %number, "Document closed");
        Ok(number)
    }

    async fn cancel_document(&mut self) -> PrintResult<()> {
        let Ok((set, _)) = self.open_context() else {
            self.cancel_any_document().await?;
            return Ok(());
        };
        match set {
            CommandSet::NonFiscal => {
                self.print_text("CANCELADO").await?;
                self.send(CMD_CLOSE_NON_FISCAL_RECEIPT, strings(&["T"]), true)
                    .await?;
            }
            fiscal => {
                let index = fiscal.index()?;
                self.send(CMD_ADD_PAYMENT[index], strings(&["Cancelar", "0", "C"]), false)
                    .await?;
            }
        }
        document_mut(&mut self.document)?.cancel()
    }

    async fn cancel_any_document(&mut self) -> PrintResult<Recovery> {
        let recovery = run_recovery(self.link.as_mut(), RECOVERY).await?;
        self.document = None;
        self.set = CommandSet::Ticket;
        Ok(recovery)
    }

    async fn daily_close(&mut self, kind: ClosureKind) -> PrintResult<ClosureReport> {
        let reply = self
            .send(CMD_DAILY_CLOSE, strings(&[kind.as_str(), "P"]), false)
            .await?;
        Ok(ClosureReport {
            kind,
            fields: serde_json::Value::from(reply.payload().to_vec()),
        })
    }

    async fn print_text(&mut self, text: &str) -> PrintResult<()> {
        let (set, _) = self.open_context()?;
        if set != CommandSet::NonFiscal {
            return Err(PrintError::DocumentState(
                "free text needs a non-fiscal document".into(),
            ));
        }
        let mut line = fit(text, 40);
        if line.is_empty() {
            line = " ".into();
        }
        self.send(CMD_PRINT_NON_FISCAL_TEXT, vec![line], false).await?;
        document_mut(&mut self.document)?.add_line(text)
    }

    async fn set_header(&mut self, lines: &[String]) -> PrintResult<()> {
        self.set_lines(lines, HEADER_LINES).await
    }

    async fn set_trailer(&mut self, lines: &[String]) -> PrintResult<()> {
        self.set_lines(lines, TRAILER_LINES).await
    }

    async fn open_drawer(&mut self) -> PrintResult<()> {
        self.send(CMD_OPEN_DRAWER, Vec::new(), false).await?;
        Ok(())
    }

    async fn status(&mut self) -> PrintResult<DeviceStatus> {
        let reply = self.send(CMD_STATUS_REQUEST, strings(&["N"]), true).await?;
        DeviceStatus::from_reply(&reply, &EPSON)
    }

    async fn last_number(
        &mut self,
        doc_type: DocumentType,
        letter: Option<char>,
    ) -> PrintResult<u64> {
        let reply = self.status_reply("A").await?;
        let letter_a = letter == Some('A');
        let index = match (doc_type, letter_a) {
            (DocumentType::CreditNote, true) => 10,
            (DocumentType::CreditNote, false) => 11,
            (_, true) => 6,
            (_, false) => 4,
        };
        reply.number(index)
    }

    async fn close(&mut self) {
        self.link.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocType, IvaType};
    use crate::link::{DummyLink, Journal};

    fn adapter(model: EpsonModel) -> (EpsonAdapter, Journal) {
        let link = DummyLink::new();
        let journal = link.journal();
        (EpsonAdapter::new(Box::new(link), model), journal)
    }

    fn registered() -> Customer {
        Customer {
            name: "Ferretería Núñez".into(),
            address: "Av. Siempre Viva 742".into(),
            doc_type: DocType::Cuit,
            doc_number: "30-71234567-1".into(),
            iva_type: IvaType::ResponsableInscripto,
        }
    }

    #[test]
    fn test_model_keys() {
        assert_eq!(EpsonModel::from_key("").unwrap(), EpsonModel::Tickeadora);
        assert_eq!(EpsonModel::from_key("epsonlx300+").unwrap(), EpsonModel::Lx300Plus);
        assert!(EpsonModel::from_key("tm-u950").is_err());
    }

    #[test]
    fn test_net_price_formats_per_model() {
        let (tm220, _) = adapter(EpsonModel::Tm220Af);
        assert_eq!(tm220.unit_price(121.0, 21.0, Some('A')), "100.0000");
        let (tmt900, _) = adapter(EpsonModel::TmT900Fa);
        assert_eq!(tmt900.unit_price(100.0, 21.0, Some('A')), "82.6446");
        let (tick, _) = adapter(EpsonModel::Tickeadora);
        assert_eq!(tick.unit_price(100.0, 21.0, Some('A')), "8264");
        // gross price for everything but letter A
        assert_eq!(tick.unit_price(2.5, 21.0, Some('B')), "2.5000");
        assert_eq!(tick.unit_price(2.5, 21.0, None), "2.5000");
    }

    #[test]
    fn test_bill_fields_layout() {
        let (a, _) = adapter(EpsonModel::Tickeadora);
        let f = a.bill_fields('A', &registered(), false);
        assert_eq!(f.len(), 19);
        assert_eq!(&f[..8], &strings(&["T", "C", "A", "1", "P", "17", "E", "I"])[..]);
        assert_eq!(f[8], "Ferreteria Nunez");
        assert_eq!(f[10], "CUIT");
        assert_eq!(f[11], "30712345671");
        assert_eq!(f[13], "Av. Siempre Viva 742");
        assert_eq!(f[16], "-");
        assert_eq!(f[18], "C");

        let f = a.bill_fields('B', &Customer::final_consumer(), true);
        assert_eq!(f[0], "M");
        assert_eq!(f[10], "-");
        assert_eq!(f[11], "-");
        assert_eq!(f[13], "-");
        assert_eq!(f[16], "-");
    }

    #[test]
    fn test_slip_bill_fields() {
        let (a, _) = adapter(EpsonModel::Lx300Plus);
        let f = a.bill_fields('B', &Customer::final_consumer(), false);
        assert_eq!(f[0], "F");
        assert_eq!(f[6], "I");
        assert_eq!(f[7], "F");
        assert_eq!(f[16], "");
    }

    #[tokio::test]
    async fn test_ticket_flow() {
        let (mut a, journal) = adapter(EpsonModel::Tickeadora);
        a.open_document(DocumentHeader::ticket()).await.unwrap();
        let mut item = Item::new("Café con leche", 2.0, 2.5, 21.0).with_discount("Promo", 0.5);
        item.description.insert(0, "Taza grande".into());
        a.add_item(item).await.unwrap();
        a.add_payment(Payment::new("Efectivo", 4.5)).await.unwrap();
        let number = a.close_document().await.unwrap();
        assert!(!number.is_empty());

        let entries = journal.entries();
        assert_eq!(
            journal.commands(),
            vec![0x40, 0x41, 0x42, 0x42, 0x44, 0x45]
        );
        assert_eq!(entries[0].fields, strings(&["C"]));
        assert_eq!(entries[1].fields, strings(&["Taza grande"]));
        assert_eq!(
            entries[2].fields,
            strings(&["Cafe con leche", "2000", "2.5000", "2100", "M", "00000", "00000000"])
        );
        assert_eq!(
            entries[3].fields,
            strings(&["Promo", "1000", "50", "2100", "R", "0", "0"])
        );
        assert_eq!(entries[4].fields, strings(&["Efectivo", "450", "T"]));
        assert_eq!(entries[5].fields, strings(&["T"]));
        assert!(!a.document().unwrap().is_open());
    }

    #[tokio::test]
    async fn test_bill_uses_bill_opcodes() {
        let (mut a, journal) = adapter(EpsonModel::Tm220Af);
        a.open_document(
            DocumentHeader::new(DocumentType::Bill)
                .with_letter('A')
                .with_customer(registered()),
        )
        .await
        .unwrap();
        a.add_item(Item::new("Tornillos", 10.0, 1.21, 21.0)).await.unwrap();
        a.add_additional_charge(Additional {
            description: String::new(),
            amount: 12.1,
            tax_rate: 21.0,
            is_discount: true,
        })
        .await
        .unwrap();
        a.add_payment(Payment::new("Cheque", 0.0)).await.unwrap();
        a.close_document().await.unwrap();

        let entries = journal.entries();
        assert_eq!(journal.commands(), vec![0x60, 0x62, 0x62, 0x64, 0x65]);
        assert_eq!(
            entries[1].fields,
            strings(&["Tornillos", "10000", "1.0000", "2100", "M", "00000", "00000000", "", "", ""])
        );
        assert_eq!(
            entries[2].fields,
            strings(&["Descuento", "1000", "1000", "2100", "R", "0", "0", "", "", ""])
        );
        assert_eq!(entries[4].fields, strings(&["T", "A", "FINAL"]));
    }

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let (mut a, journal) = adapter(EpsonModel::Tickeadora);
        let customer = Customer {
            doc_type: DocType::Dni,
            ..registered()
        };
        let err = a
            .open_document(
                DocumentHeader::new(DocumentType::Bill)
                    .with_letter('A')
                    .with_customer(customer),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::Validation { .. }));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_no_items_after_close() {
        let (mut a, _) = adapter(EpsonModel::Tickeadora);
        a.open_document(DocumentHeader::ticket()).await.unwrap();
        a.close_document().await.unwrap();
        let err = a
            .add_item(Item::new("late", 1.0, 1.0, 21.0))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::DocumentState(_)));
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let (mut a, _) = adapter(EpsonModel::Tickeadora);
        a.open_document(DocumentHeader::ticket()).await.unwrap();
        assert!(a.open_document(DocumentHeader::ticket()).await.is_err());
    }

    #[tokio::test]
    async fn test_close_without_document_resyncs() {
        let (mut a, journal) = adapter(EpsonModel::Tickeadora);
        let number = a.close_document().await.unwrap();
        assert!(!number.is_empty());
        assert_eq!(journal.commands(), vec![0x2a]);
        assert_eq!(journal.entries()[0].fields, strings(&["A"]));
    }

    #[tokio::test]
    async fn test_non_fiscal_cancel_prints_marker() {
        let (mut a, journal) = adapter(EpsonModel::Tickeadora);
        a.open_document(DocumentHeader::new(DocumentType::NonFiscal))
            .await
            .unwrap();
        a.print_text("Hola").await.unwrap();
        a.cancel_document().await.unwrap();
        assert_eq!(journal.commands(), vec![0x48, 0x49, 0x49, 0x4a]);
        assert_eq!(journal.entries()[2].fields, strings(&["CANCELADO"]));
        assert!(journal.entries()[3].skip_status);
    }

    #[tokio::test]
    async fn test_header_and_trailer_padding() {
        let (mut a, journal) = adapter(EpsonModel::Tickeadora);
        a.set_header(&strings(&["Mi Negocio"])).await.unwrap();
        a.set_trailer(&[]).await.unwrap();

        let entries = journal.entries();
        assert_eq!(entries.len(), 3 + 9);
        assert_eq!(entries[0].fields, strings(&["3", "Mi Negocio"]));
        assert_eq!(entries[1].fields, strings(&["4", "\u{7f}"]));
        assert_eq!(entries[3].fields[0], "11");
        assert_eq!(entries[11].fields[0], "19");
    }

    #[tokio::test]
    async fn test_slip_ticket_is_a_bill() {
        let (mut a, journal) = adapter(EpsonModel::Lx300Plus);
        a.open_document(DocumentHeader::ticket()).await.unwrap();
        a.add_item(Item::new("Item", 3.0, 1.0, 10.5)).await.unwrap();
        a.close_document().await.unwrap();

        let entries = journal.entries();
        assert_eq!(journal.commands(), vec![0x60, 0x62, 0x65]);
        assert_eq!(entries[0].fields[2], "B");
        assert_eq!(entries[0].fields[8], "CONSUMIDOR FINAL");
        assert_eq!(entries[1].fields[5], "3");
        assert_eq!(entries[1].fields[3], "1050");
        assert_eq!(entries[2].fields, strings(&["F", "B", "FINAL"]));
    }

    #[tokio::test]
    async fn test_daily_close_and_status() {
        let (mut a, journal) = adapter(EpsonModel::Tickeadora);
        let report = a.daily_close(ClosureKind::Z).await.unwrap();
        assert_eq!(report.fields.as_array().unwrap().len(), 11);
        assert_eq!(journal.entries()[0].fields, strings(&["Z", "P"]));

        let status = a.status().await.unwrap();
        assert_eq!(status.printer_status, 0);
        assert!(status.fault.is_none());
        assert!(journal.entries()[1].skip_status);
    }
}
