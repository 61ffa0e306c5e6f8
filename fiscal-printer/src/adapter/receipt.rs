//! ESC/POS receipts on non-fiscal printers
//!
//! The document is kept in memory and rendered in one piece on close, so
//! a cancelled receipt never reaches the paper.

use super::{
    Capability, ClosureKind, ClosureReport, CommandAdapter, DeviceStatus, Recovery, document_mut,
    ensure_closed,
};
use crate::document::{Additional, Document, DocumentHeader, DocumentType, Item, Payment};
use crate::error::{PrintError, PrintResult};
use crate::escpos::EscPosBuilder;
use crate::money::{fixed, to_decimal};
use crate::sink::{self, RawSink};
use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::models::DriverConfig;
use tracing::{debug, info, instrument};

/// 80mm paper
pub const DEFAULT_WIDTH: usize = 48;

#[derive(Debug)]
pub struct ReceiptAdapter {
    sink: Box<dyn RawSink>,
    width: usize,
    document: Option<Document>,
    header: Vec<String>,
    trailer: Vec<String>,
    /// Local receipt counter; plain printers keep no numbering
    last_number: u64,
}

impl ReceiptAdapter {
    pub fn new(sink: Box<dyn RawSink>, width: usize) -> Self {
        Self {
            sink,
            width,
            document: None,
            header: Vec::new(),
            trailer: Vec::new(),
            last_number: 0,
        }
    }

    pub fn for_driver(driver: &DriverConfig) -> PrintResult<Self> {
        Ok(Self::new(sink::for_driver(driver)?, DEFAULT_WIDTH))
    }

    fn title(doc_type: DocumentType) -> &'static str {
        match doc_type {
            DocumentType::Ticket | DocumentType::Receipt => "TICKET",
            DocumentType::Bill => "FACTURA",
            DocumentType::DebitNote => "NOTA DE DEBITO",
            DocumentType::CreditNote => "NOTA DE CREDITO",
            DocumentType::Remit => "REMITO",
            DocumentType::NonFiscal => "DOCUMENTO NO FISCAL",
        }
    }

    fn money(value: Decimal) -> String {
        fixed(value, 2)
    }

    fn render(&self, doc: &Document, number: u64) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.width);

        b.center();
        for line in &self.header {
            b.line(line);
        }
        b.bold().double_size();
        b.line(Self::title(doc.doc_type()));
        b.reset_size().bold_off();
        b.line(&format!("Nro {:08}", number));

        let customer = &doc.header().customer;
        b.left();
        if !customer.name.is_empty() {
            b.sep_single();
            b.line(&customer.name);
            if !customer.doc_number.is_empty() {
                b.line(&customer.doc_number);
            }
            if !customer.address.is_empty() {
                b.line(&customer.address);
            }
        }

        if !doc.items().is_empty() {
            b.sep_single();
        }
        for item in doc.items() {
            for line in item.leading_lines() {
                b.line(line);
            }
            let gross = to_decimal(item.quantity) * to_decimal(item.unit_price);
            let gross = if item.negative { -gross } else { gross };
            b.line(&format!(
                "{} x {}",
                to_decimal(item.quantity).normalize(),
                Self::money(to_decimal(item.unit_price))
            ));
            b.line_lr(item.line(), &Self::money(gross));
            if let Some(d) = item.discount.as_ref().filter(|d| d.amount != 0.0) {
                b.line_lr(&d.description, &Self::money(-to_decimal(d.amount)));
            }
        }
        for additional in doc.additionals() {
            let label = match (additional.description.is_empty(), additional.is_discount) {
                (false, _) => additional.description.as_str(),
                (true, true) => "Descuento",
                (true, false) => "Recargo",
            };
            b.line_lr(label, &Self::money(additional.signed()));
        }

        for line in doc.lines() {
            b.line(line);
        }

        let total = Decimal::new(doc.total_cents(), 2);
        if !doc.items().is_empty() {
            b.sep_double();
            b.bold();
            b.line_lr("TOTAL", &Self::money(total));
            b.bold_off();
        }
        for payment in doc.payments() {
            b.line_lr(&payment.description, &Self::money(to_decimal(payment.amount)));
        }
        let change = Decimal::new(doc.paid_cents() - doc.total_cents(), 2);
        if !doc.payments().is_empty() && change > Decimal::ZERO {
            b.line_lr("Vuelto", &Self::money(change));
        }

        if !self.trailer.is_empty() {
            b.newline();
            b.center();
            for line in &self.trailer {
                b.line(line);
            }
        }
        b.cut_feed(4);
        b.build()
    }
}

#[async_trait]
impl CommandAdapter for ReceiptAdapter {
    fn capability(&self) -> Capability {
        Capability::Receipt
    }

    fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    async fn open_document(&mut self, header: DocumentHeader) -> PrintResult<()> {
        ensure_closed(&self.document)?;
        self.document = Some(Document::open(header)?);
        Ok(())
    }

    async fn add_item(&mut self, item: Item) -> PrintResult<()> {
        document_mut(&mut self.document)?.add_item(item)
    }

    async fn add_payment(&mut self, payment: Payment) -> PrintResult<()> {
        document_mut(&mut self.document)?.add_payment(payment)
    }

    async fn add_additional_charge(&mut self, additional: Additional) -> PrintResult<()> {
        document_mut(&mut self.document)?.add_additional(additional)
    }

    #[instrument(skip(self))]
    async fn close_document(&mut self) -> PrintResult<String> {
        let number = self.last_number + 1;
        let doc = match &self.document {
            Some(doc) if doc.is_open() => doc,
            _ => return Err(PrintError::DocumentState("no document is open".into())),
        };
        let data = self.render(doc, number);
        self.sink.print(&data).await?;

        document_mut(&mut self.document)?.close()?;
        self.last_number = number;
        info!(number, bytes = data.len(), "Receipt printed");
        Ok(number.to_string())
    }

    async fn cancel_document(&mut self) -> PrintResult<()> {
        match document_mut(&mut self.document) {
            Ok(doc) => doc.cancel(),
            Err(_) => Ok(()),
        }
    }

    async fn cancel_any_document(&mut self) -> PrintResult<Recovery> {
        if self.document.take().is_some() {
            debug!("Discarded buffered receipt");
        }
        Ok(Recovery { step: "discard" })
    }

    async fn daily_close(&mut self, _kind: ClosureKind) -> PrintResult<ClosureReport> {
        Err(PrintError::Unsupported("daily close on a receipt printer".into()))
    }

    async fn print_text(&mut self, text: &str) -> PrintResult<()> {
        document_mut(&mut self.document)?.add_line(text)
    }

    async fn set_header(&mut self, lines: &[String]) -> PrintResult<()> {
        self.header = lines.to_vec();
        Ok(())
    }

    async fn set_trailer(&mut self, lines: &[String]) -> PrintResult<()> {
        self.trailer = lines.to_vec();
        Ok(())
    }

    async fn open_drawer(&mut self) -> PrintResult<()> {
        let mut b = EscPosBuilder::new(self.width);
        b.open_drawer();
        self.sink.print(&b.build()).await
    }

    async fn status(&mut self) -> PrintResult<DeviceStatus> {
        Err(PrintError::Unsupported("status words on a receipt printer".into()))
    }

    async fn last_number(
        &mut self,
        _doc_type: DocumentType,
        _letter: Option<char>,
    ) -> PrintResult<u64> {
        Ok(self.last_number)
    }

    async fn close(&mut self) {}
}
