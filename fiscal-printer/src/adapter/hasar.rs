//! Hasar fiscal command set
//!
//! Payments are held until close and sent right before the close command.
//! Text limits depend on the model; see [`text_width`].

use super::tables::hasar::{TextContext, doc_type_code, iva_code, text_width};
use super::{
    Capability, ClosureKind, ClosureReport, CommandAdapter, DeviceStatus, Recovery, RecoveryStep,
    document_mut, ensure_closed, run_recovery, strings,
};
use crate::document::{
    Additional, Customer, DocType, Document, DocumentHeader, DocumentType, Item, Payment, clean_doc_number,
};
use crate::encoding::fit;
use crate::error::{PrintError, PrintResult};
use crate::link::{FiscalLink, Reply};
use crate::money::{fixed, plain, to_decimal};
use crate::protocol::frame::DEL;
use crate::protocol::status::{FISCAL_DOCUMENT_OPEN, HASAR};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

const CMD_STATUS_REQUEST: u8 = 0x2a;
const CMD_DAILY_CLOSE: u8 = 0x39;
const CMD_OPEN_FISCAL_RECEIPT: u8 = 0x40;
const CMD_PRINT_TEXT_IN_FISCAL: u8 = 0x41;
const CMD_PRINT_LINE_ITEM: u8 = 0x42;
const CMD_ADD_PAYMENT: u8 = 0x44;
const CMD_CLOSE_FISCAL_RECEIPT: u8 = 0x45;
const CMD_OPEN_NON_FISCAL_RECEIPT: u8 = 0x48;
const CMD_PRINT_NON_FISCAL_TEXT: u8 = 0x49;
const CMD_CLOSE_NON_FISCAL_RECEIPT: u8 = 0x4a;
const CMD_GENERAL_DISCOUNT: u8 = 0x54;
const CMD_LAST_ITEM_DISCOUNT: u8 = 0x55;
const CMD_SET_HEADER_TRAILER: u8 = 0x5d;
const CMD_SET_CUSTOMER_DATA: u8 = 0x62;
const CMD_OPEN_DRAWER: u8 = 0x7b;
const CMD_OPEN_DNFH: u8 = 0x80;
const CMD_CLOSE_DNFH: u8 = 0x81;
const CMD_PRINT_EMBARK_ITEM: u8 = 0x82;
const CMD_CREDIT_NOTE_REFERENCE: u8 = 0x93;
const CMD_CANCEL_ANY: u8 = 0x98;
const CMD_REPRINT: u8 = 0x99;

const HEADER_LINES: std::ops::Range<u8> = 3..6;
const TRAILER_LINES: std::ops::Range<u8> = 11..20;

/// Daily close replies shorter than this carry no totals
const CLOSURE_FIELDS: usize = 29;

/// Names of the daily close totals from field 3 on; field 8 is reserved
const CLOSURE_NAMES: &[(usize, &str)] = &[
    (3, "zeta_numero"),
    (4, "cant_doc_fiscales_cancelados"),
    (5, "cant_doc_nofiscales_homologados"),
    (6, "cant_doc_nofiscales"),
    (7, "cant_doc_fiscales"),
    (9, "ultimo_doc_b"),
    (10, "ultimo_doc_a"),
    (11, "monto_ventas_doc_fiscal"),
    (12, "monto_iva_doc_fiscal"),
    (13, "monto_imp_internos"),
    (14, "monto_percepciones"),
    (15, "monto_iva_no_inscripto"),
    (16, "ultima_nc_b"),
    (17, "ultima_nc_a"),
    (18, "monto_credito_nc"),
    (19, "monto_iva_nc"),
    (20, "monto_imp_internos_nc"),
    (21, "monto_percepciones_nc"),
    (22, "monto_iva_no_inscripto_nc"),
    (23, "ultimo_remito"),
    (24, "cant_nc_canceladas"),
    (25, "cant_doc_fiscales_bc_emitidos"),
    (26, "cant_doc_fiscales_a_emitidos"),
    (27, "cant_nc_bc_emitidos"),
    (28, "cant_nc_a_fiscales_a_emitidos"),
];

const RECOVERY: &[RecoveryStep] = &[
    RecoveryStep {
        name: "cancel_any",
        command: CMD_CANCEL_ANY,
        fields: &[],
    },
    RecoveryStep {
        name: "cancel_payment",
        command: CMD_ADD_PAYMENT,
        fields: &["Cancelar", "0.00", "C", "1"],
    },
    RecoveryStep {
        name: "close_non_fiscal",
        command: CMD_CLOSE_NON_FISCAL_RECEIPT,
        fields: &[],
    },
    RecoveryStep {
        name: "close_fiscal",
        command: CMD_CLOSE_FISCAL_RECEIPT,
        fields: &[],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HasarModel {
    #[default]
    H615,
    H715v1,
    H715v2,
    H320,
}

impl HasarModel {
    pub fn from_key(key: &str) -> PrintResult<Self> {
        match key {
            "" | "615" => Ok(HasarModel::H615),
            "715v1" | "715" => Ok(HasarModel::H715v1),
            "715v2" => Ok(HasarModel::H715v2),
            "320" => Ok(HasarModel::H320),
            other => Err(PrintError::UnsupportedModel(format!("hasar {}", other))),
        }
    }

    /// Wide paper layout
    fn is_wide(&self) -> bool {
        matches!(self, HasarModel::H320)
    }

    /// Customer data carries an address line
    fn sends_address(&self) -> bool {
        !matches!(self, HasarModel::H615)
    }

    fn has_drawer(&self) -> bool {
        matches!(self, HasarModel::H715v1 | HasarModel::H715v2)
    }
}

#[derive(Debug)]
pub struct HasarAdapter {
    link: Box<dyn FiscalLink>,
    model: HasarModel,
    document: Option<Document>,
    /// Payments formatted for the close sequence
    pending_payments: Vec<(String, String)>,
}

impl HasarAdapter {
    pub fn new(link: Box<dyn FiscalLink>, model: HasarModel) -> Self {
        Self {
            link,
            model,
            document: None,
            pending_payments: Vec::new(),
        }
    }

    pub fn model(&self) -> HasarModel {
        self.model
    }

    fn text(&self, text: &str, context: TextContext) -> String {
        fit(text, text_width(context, self.model.is_wide()))
    }

    async fn send(&mut self, command: u8, fields: Vec<String>, skip_status: bool) -> PrintResult<Reply> {
        self.link.send_command(command, &fields, skip_status).await
    }

    fn open_type(&mut self) -> PrintResult<DocumentType> {
        Ok(document_mut(&mut self.document)?.doc_type())
    }

    /// Fields of the customer data command
    fn customer_fields(&self, customer: &Customer) -> PrintResult<Vec<String>> {
        let mut doc = clean_doc_number(customer.doc_number.trim());
        let mut doc_code = doc_type_code(customer.doc_type);
        if !doc.is_empty()
            && customer.doc_type != DocType::Pasaporte
            && !doc.chars().all(|c| c.is_ascii_digit())
        {
            // letters in a number the firmware would reject
            doc = String::new();
            doc_code = " ";
        }
        if doc.is_empty() {
            doc_code = " ";
        }

        let iva = iva_code(customer.iva_type);
        if iva != "C" && (doc.is_empty() || doc_code != "C") {
            return Err(PrintError::missing_tax_id(
                "a customer who is not a final consumer must be identified by CUIT",
            ));
        }

        let mut fields = vec![
            self.text(&customer.name, TextContext::CustomerName),
            if doc.is_empty() { " ".to_string() } else { doc },
            iva.to_string(),
            doc_code.to_string(),
        ];
        if self.model.sends_address() {
            let address = self.text(&customer.address, TextContext::CustomerAddress);
            fields.push(if address.is_empty() { " ".to_string() } else { address });
        }
        Ok(fields)
    }

    async fn set_lines(&mut self, lines: &[String], range: std::ops::Range<u8>) -> PrintResult<()> {
        let clear = char::from(DEL).to_string();
        for (i, line) in range.enumerate() {
            let text = lines.get(i).cloned().unwrap_or_else(|| clear.clone());
            if text.is_empty() {
                continue;
            }
            self.send(CMD_SET_HEADER_TRAILER, vec![line.to_string(), text], false)
                .await?;
        }
        Ok(())
    }

    async fn status_reply(&mut self) -> PrintResult<Reply> {
        let reply = self.send(CMD_STATUS_REQUEST, Vec::new(), true).await?;
        if reply.len() < 3 {
            return self.send(CMD_STATUS_REQUEST, Vec::new(), false).await;
        }
        Ok(reply)
    }

    async fn open_non_fiscal(&mut self) -> PrintResult<()> {
        let in_document = |reply: &Reply| {
            reply
                .fiscal_status()
                .is_ok_and(|s| s & FISCAL_DOCUMENT_OPEN == FISCAL_DOCUMENT_OPEN)
        };
        let reply = self.send(CMD_OPEN_NON_FISCAL_RECEIPT, Vec::new(), false).await?;
        if in_document(&reply) {
            return Ok(());
        }
        debug!("Non-fiscal open not taken, retrying");
        let reply = self.send(CMD_OPEN_NON_FISCAL_RECEIPT, Vec::new(), false).await?;
        if in_document(&reply) {
            return Ok(());
        }
        Err(PrintError::DocumentState(
            "printer did not accept the non-fiscal receipt".into(),
        ))
    }
}

#[async_trait]
impl CommandAdapter for HasarAdapter {
    fn capability(&self) -> Capability {
        Capability::Fiscal
    }

    fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    #[instrument(skip(self, header), fields(doc_type = ?header.doc_type))]
    async fn open_document(&mut self, header: DocumentHeader) -> PrintResult<()> {
        ensure_closed(&self.document)?;
        let doc = Document::open(header)?;
        let header = doc.header();
        let letter_a = header.is_letter_a();

        // validate the customer before anything goes out
        let customer = if header.doc_type.identifies_customer() {
            Some(self.customer_fields(&header.customer)?)
        } else {
            None
        };
        if let Some(fields) = customer {
            self.send(CMD_SET_CUSTOMER_DATA, fields, false).await?;
        }

        match header.doc_type {
            DocumentType::Ticket => {
                let fields = if self.model == HasarModel::H320 {
                    vec![header.letter.unwrap_or('B').to_string(), "T".into()]
                } else {
                    strings(&["T", "T"])
                };
                self.send(CMD_OPEN_FISCAL_RECEIPT, fields, false).await?;
            }
            DocumentType::Bill => {
                let kind = if letter_a { "A" } else { "B" };
                self.send(CMD_OPEN_FISCAL_RECEIPT, strings(&[kind, "T"]), false)
                    .await?;
            }
            DocumentType::DebitNote => {
                let kind = if letter_a { "D" } else { "E" };
                self.send(CMD_OPEN_FISCAL_RECEIPT, strings(&[kind, "T"]), false)
                    .await?;
            }
            DocumentType::CreditNote => {
                let reference = header.reference.clone().unwrap_or_else(|| "NC".into());
                self.send(CMD_CREDIT_NOTE_REFERENCE, vec!["1".into(), reference], false)
                    .await?;
                let kind = if letter_a { "R" } else { "S" };
                self.send(CMD_OPEN_DNFH, strings(&[kind, "T"]), false).await?;
            }
            DocumentType::Remit => {
                self.send(CMD_OPEN_DNFH, strings(&["r", "T"]), false).await?;
            }
            DocumentType::NonFiscal => self.open_non_fiscal().await?,
            DocumentType::Receipt => {
                return Err(PrintError::Unsupported(
                    "sales receipts on Hasar printers".into(),
                ));
            }
        }

        self.pending_payments.clear();
        self.document = Some(doc);
        Ok(())
    }

    async fn add_item(&mut self, item: Item) -> PrintResult<()> {
        let doc_type = self.open_type()?;
        if !doc_type.is_fiscal() {
            return Err(PrintError::DocumentState(format!(
                "items are not allowed on a {:?} document",
                doc_type
            )));
        }
        item.validate()?;

        for line in item.leading_lines() {
            let text = self.text(line, TextContext::FiscalText);
            self.send(CMD_PRINT_TEXT_IN_FISCAL, vec![text, "0".into()], false)
                .await?;
        }

        let sign = if item.negative { "m" } else { "M" };
        let fields = vec![
            self.text(item.line(), TextContext::LineItem),
            plain(item.quantity),
            plain(item.unit_price),
            plain(item.tax_rate),
            sign.to_string(),
            "0.0".to_string(),
            "1".to_string(),
            "T".to_string(),
        ];
        self.send(CMD_PRINT_LINE_ITEM, fields, false).await?;

        if let Some(discount) = item.discount.as_ref().filter(|d| d.amount != 0.0) {
            let fields = vec![
                self.text(&discount.description, TextContext::DiscountDescription),
                plain(discount.amount),
                "m".to_string(),
                "1".to_string(),
                "T".to_string(),
            ];
            self.send(CMD_LAST_ITEM_DISCOUNT, fields, false).await?;
        }

        document_mut(&mut self.document)?.add_item(item)
    }

    async fn add_payment(&mut self, payment: Payment) -> PrintResult<()> {
        self.open_type()?;
        let amount = fixed(to_decimal(payment.amount), 2);
        document_mut(&mut self.document)?.add_payment(payment.clone())?;
        self.pending_payments.push((payment.description, amount));
        Ok(())
    }

    async fn add_additional_charge(&mut self, additional: Additional) -> PrintResult<()> {
        self.open_type()?;
        let sign = if additional.is_discount { "m" } else { "M" };
        let fields = vec![
            self.text(&additional.description, TextContext::GeneralDiscount),
            plain(additional.amount),
            sign.to_string(),
            "1".to_string(),
            "T".to_string(),
        ];
        self.send(CMD_GENERAL_DISCOUNT, fields, false).await?;
        document_mut(&mut self.document)?.add_additional(additional)
    }

    async fn add_remit_item(&mut self, description: &str, quantity: f64) -> PrintResult<()> {
        if self.open_type()? != DocumentType::Remit {
            return Err(PrintError::DocumentState(
                "embark items need an open remit".into(),
            ));
        }
        let fields = vec![
            self.text(description, TextContext::EmbarkItem),
            plain(quantity),
            "1".to_string(),
        ];
        self.send(CMD_PRINT_EMBARK_ITEM, fields, false).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn close_document(&mut self) -> PrintResult<String> {
        let doc_type = match self.open_type() {
            Ok(doc_type) => doc_type,
            Err(_) => {
                let (doc_type, letter) = self
                    .document
                    .as_ref()
                    .map(|d| (d.doc_type(), d.letter()))
                    .unwrap_or((DocumentType::Ticket, None));
                warn!("Close requested with no open document, re-syncing with the device");
                return self.last_number(doc_type, letter).await.map(|n| n.to_string());
            }
        };

        let number = match doc_type {
            DocumentType::Ticket | DocumentType::Bill | DocumentType::DebitNote => {
                // a payment leaves the buffer only once the printer took it
                while let Some((description, amount)) = self.pending_payments.first().cloned() {
                    let fields = vec![
                        self.text(&description, TextContext::PaymentDescription),
                        amount,
                        "T".to_string(),
                        "1".to_string(),
                    ];
                    self.send(CMD_ADD_PAYMENT, fields, false).await?;
                    self.pending_payments.remove(0);
                }
                let reply = self.send(CMD_CLOSE_FISCAL_RECEIPT, Vec::new(), false).await?;
                reply.required(2)?.to_string()
            }
            DocumentType::NonFiscal => {
                let reply = self
                    .send(CMD_CLOSE_NON_FISCAL_RECEIPT, Vec::new(), false)
                    .await?;
                reply.field(2).unwrap_or_default().to_string()
            }
            DocumentType::CreditNote => {
                let reply = self.send(CMD_CLOSE_DNFH, Vec::new(), false).await?;
                reply.required(2)?.to_string()
            }
            DocumentType::Remit => {
                let copies = self
                    .document
                    .as_ref()
                    .map(|d| d.header().copies)
                    .unwrap_or(1);
                let reply = self.send(CMD_CLOSE_DNFH, Vec::new(), false).await?;
                for _ in 1..copies {
                    self.send(CMD_REPRINT, Vec::new(), false).await?;
                }
                reply.required(2)?.to_string()
            }
            DocumentType::Receipt => {
                return Err(PrintError::Unsupported(
                    "sales receipts on Hasar printers".into(),
                ));
            }
        };

        document_mut(&mut self.document)?.close()?;
        info!(number = %number, "Document closed");
        Ok(number)
    }

    async fn cancel_document(&mut self) -> PrintResult<()> {
        let Ok(doc_type) = self.open_type() else {
            self.cancel_any_document().await?;
            return Ok(());
        };
        match doc_type {
            DocumentType::NonFiscal => {
                self.print_text("CANCELADO").await?;
                self.send(CMD_CLOSE_NON_FISCAL_RECEIPT, Vec::new(), false)
                    .await?;
            }
            DocumentType::Remit | DocumentType::Receipt => {
                run_recovery(self.link.as_mut(), RECOVERY).await?;
            }
            _ => {
                let cancelled = self
                    .send(CMD_ADD_PAYMENT, strings(&["Cancelar", "0.00", "C", "1"]), false)
                    .await;
                if let Err(e) = cancelled {
                    warn!(error = %e, "Cancel payment refused, forcing recovery");
                    run_recovery(self.link.as_mut(), RECOVERY).await?;
                }
            }
        }
        self.pending_payments.clear();
        document_mut(&mut self.document)?.cancel()
    }

    async fn cancel_any_document(&mut self) -> PrintResult<Recovery> {
        let recovery = run_recovery(self.link.as_mut(), RECOVERY).await?;
        self.document = None;
        self.pending_payments.clear();
        Ok(recovery)
    }

    async fn daily_close(&mut self, kind: ClosureKind) -> PrintResult<ClosureReport> {
        let reply = self
            .send(CMD_DAILY_CLOSE, strings(&[kind.as_str()]), false)
            .await?;
        let fields = if reply.len() >= CLOSURE_FIELDS {
            let named: Map<String, Value> = CLOSURE_NAMES
                .iter()
                .map(|(i, name)| (name.to_string(), Value::from(reply.fields[*i].clone())))
                .collect();
            Value::Object(named)
        } else {
            Value::from(reply.fields.get(3..).unwrap_or(&[]).to_vec())
        };
        Ok(ClosureReport { kind, fields })
    }

    async fn print_text(&mut self, text: &str) -> PrintResult<()> {
        if self.open_type()? != DocumentType::NonFiscal {
            return Err(PrintError::DocumentState(
                "free text needs a non-fiscal document".into(),
            ));
        }
        let mut line = self.text(text, TextContext::NonFiscalText);
        if line.is_empty() {
            line = " ".into();
        }
        self.send(CMD_PRINT_NON_FISCAL_TEXT, vec![line, "0".into()], false)
            .await?;
        document_mut(&mut self.document)?.add_line(text)
    }

    async fn set_header(&mut self, lines: &[String]) -> PrintResult<()> {
        self.set_lines(lines, HEADER_LINES).await
    }

    async fn set_trailer(&mut self, lines: &[String]) -> PrintResult<()> {
        self.set_lines(lines, TRAILER_LINES).await
    }

    async fn open_drawer(&mut self) -> PrintResult<()> {
        if !self.model.has_drawer() {
            return Err(PrintError::Unsupported(format!(
                "cash drawer on Hasar {:?}",
                self.model
            )));
        }
        self.send(CMD_OPEN_DRAWER, Vec::new(), false).await?;
        Ok(())
    }

    async fn status(&mut self) -> PrintResult<DeviceStatus> {
        let reply = self.status_reply().await?;
        DeviceStatus::from_reply(&reply, &HASAR)
    }

    async fn last_number(
        &mut self,
        doc_type: DocumentType,
        letter: Option<char>,
    ) -> PrintResult<u64> {
        let reply = self.status_reply().await?;
        let letter_a = letter == Some('A');
        let index = match (doc_type, letter_a) {
            (DocumentType::Remit, _) => 8,
            (DocumentType::CreditNote, true) => 7,
            (DocumentType::CreditNote, false) => 6,
            (_, true) => 4,
            (_, false) => 2,
        };
        reply.number(index)
    }

    async fn close(&mut self) {
        self.link.close().await;
    }
}
