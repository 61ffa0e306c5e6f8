//! In-memory fiscal document
//!
//! A [`Document`] is created by an adapter's open operation and lives until
//! close or cancel. Its state machine is strict:
//!
//! ```text
//! Open -> (item | payment | additional)* -> Closed | Cancelled
//! ```

use crate::error::{PrintError, PrintResult};
use crate::money::{round_cents, to_decimal};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Ticket,
    Bill,
    DebitNote,
    CreditNote,
    Remit,
    /// ESC/POS sales receipt
    Receipt,
    NonFiscal,
}

impl DocumentType {
    /// Needs customer identification on the device
    pub fn identifies_customer(&self) -> bool {
        matches!(
            self,
            DocumentType::Bill | DocumentType::DebitNote | DocumentType::CreditNote | DocumentType::Remit
        )
    }

    pub fn is_fiscal(&self) -> bool {
        matches!(
            self,
            DocumentType::Ticket | DocumentType::Bill | DocumentType::DebitNote | DocumentType::CreditNote
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Open,
    Closed,
    Cancelled,
}

/// Buyer's tax category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IvaType {
    ResponsableInscripto,
    ResponsableNoInscripto,
    Exento,
    NoResponsable,
    #[default]
    ConsumidorFinal,
    #[serde(rename = "RESPONSABLE_NO_INSCRIPTO_BIENES_DE_USO")]
    BienesDeUso,
    #[serde(rename = "RESPONSABLE_MONOTRIBUTO")]
    Monotributo,
    #[serde(rename = "MONOTRIBUTISTA_SOCIAL")]
    MonotributoSocial,
    #[serde(rename = "PEQUENIO_CONTRIBUYENTE_EVENTUAL")]
    Eventual,
    #[serde(rename = "PEQUENIO_CONTRIBUYENTE_EVENTUAL_SOCIAL")]
    EventualSocial,
    NoCategorizado,
}

/// Buyer's identity document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    Cuit,
    LibretaEnrolamiento,
    LibretaCivica,
    Dni,
    Pasaporte,
    Cedula,
    #[default]
    SinCalificador,
}

/// Strip the separators people type into tax ids
pub fn clean_doc_number(doc: &str) -> String {
    doc.chars().filter(|c| *c != '-' && *c != '.').collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub doc_type: DocType,
    #[serde(default)]
    pub doc_number: String,
    #[serde(default)]
    pub iva_type: IvaType,
}

impl Customer {
    pub fn final_consumer() -> Self {
        Self::default()
    }

    /// A CUIT made of digits only
    pub fn has_valid_tax_id(&self) -> bool {
        let doc = clean_doc_number(&self.doc_number);
        self.doc_type == DocType::Cuit && !doc.is_empty() && doc.chars().all(|c| c.is_ascii_digit())
    }

    /// Everyone except final consumers must be identified by CUIT
    pub fn validate(&self) -> PrintResult<()> {
        if self.iva_type != IvaType::ConsumidorFinal && !self.has_valid_tax_id() {
            return Err(PrintError::missing_tax_id(
                "a customer who is not a final consumer must be identified by CUIT",
            ));
        }
        Ok(())
    }
}

/// Everything needed to open a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub doc_type: DocumentType,
    /// Bill letter (A, B, C, M)
    #[serde(default)]
    pub letter: Option<char>,
    #[serde(default)]
    pub customer: Customer,
    /// Original document a credit or debit note refers to
    #[serde(default)]
    pub reference: Option<String>,
    /// Printed copies (remits)
    #[serde(default = "default_copies")]
    pub copies: u32,
}

fn default_copies() -> u32 {
    1
}

impl DocumentHeader {
    pub fn new(doc_type: DocumentType) -> Self {
        Self {
            doc_type,
            letter: None,
            customer: Customer::default(),
            reference: None,
            copies: 1,
        }
    }

    pub fn ticket() -> Self {
        Self::new(DocumentType::Ticket)
    }

    pub fn with_letter(mut self, letter: char) -> Self {
        self.letter = Some(letter.to_ascii_uppercase());
        self
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = customer;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies.max(1);
        self
    }

    pub fn is_letter_a(&self) -> bool {
        self.letter == Some('A')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Printed lines; the last one is the item line itself
    pub description: Vec<String>,
    pub quantity: f64,
    pub unit_price: f64,
    /// VAT percent
    pub tax_rate: f64,
    #[serde(default)]
    pub discount: Option<Discount>,
    /// Return or correction line
    #[serde(default)]
    pub negative: bool,
}

impl Item {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64, tax_rate: f64) -> Self {
        Self {
            description: vec![description.into()],
            quantity,
            unit_price,
            tax_rate,
            discount: None,
            negative: false,
        }
    }

    pub fn with_discount(mut self, description: impl Into<String>, amount: f64) -> Self {
        self.discount = Some(Discount {
            description: description.into(),
            amount,
        });
        self
    }

    pub fn negative(mut self) -> Self {
        self.negative = true;
        self
    }

    /// Item line text (the last description line)
    pub fn line(&self) -> &str {
        self.description.last().map(String::as_str).unwrap_or("")
    }

    /// Lines printed before the item line
    pub fn leading_lines(&self) -> &[String] {
        match self.description.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// Finite amounts and a positive quantity
    pub fn validate(&self) -> PrintResult<()> {
        if !self.quantity.is_finite() || !self.unit_price.is_finite() || self.quantity <= 0.0 {
            return Err(PrintError::validation(format!(
                "invalid item '{}': quantity {} price {}",
                self.line(),
                self.quantity,
                self.unit_price
            )));
        }
        Ok(())
    }

    pub fn total(&self) -> Decimal {
        let mut total = to_decimal(self.quantity) * to_decimal(self.unit_price);
        if let Some(d) = &self.discount {
            total -= to_decimal(d.amount);
        }
        if self.negative { -total } else { total }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub description: String,
    pub amount: f64,
}

impl Payment {
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            description: description.into(),
            amount,
        }
    }
}

/// Document level surcharge or discount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Additional {
    pub description: String,
    pub amount: f64,
    pub tax_rate: f64,
    pub is_discount: bool,
}

impl Additional {
    pub fn signed(&self) -> Decimal {
        let amount = to_decimal(self.amount);
        if self.is_discount { -amount } else { amount }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    header: DocumentHeader,
    items: Vec<Item>,
    payments: Vec<Payment>,
    additionals: Vec<Additional>,
    /// Free text lines (non-fiscal documents)
    lines: Vec<String>,
    state: DocumentState,
}

impl Document {
    /// Open a document; identified documents validate the customer first
    pub fn open(header: DocumentHeader) -> PrintResult<Self> {
        if header.doc_type.identifies_customer() {
            header.customer.validate()?;
        }
        Ok(Self {
            header,
            items: Vec::new(),
            payments: Vec::new(),
            additionals: Vec::new(),
            lines: Vec::new(),
            state: DocumentState::Open,
        })
    }

    pub fn header(&self) -> &DocumentHeader {
        &self.header
    }

    pub fn doc_type(&self) -> DocumentType {
        self.header.doc_type
    }

    pub fn letter(&self) -> Option<char> {
        self.header.letter
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == DocumentState::Open
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn additionals(&self) -> &[Additional] {
        &self.additionals
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn ensure_open(&self, action: &str) -> PrintResult<()> {
        if self.state != DocumentState::Open {
            return Err(PrintError::DocumentState(format!(
                "cannot {} a {:?} document",
                action, self.state
            )));
        }
        Ok(())
    }

    pub fn add_item(&mut self, item: Item) -> PrintResult<()> {
        self.ensure_open("add an item to")?;
        item.validate()?;
        self.items.push(item);
        Ok(())
    }

    pub fn add_payment(&mut self, payment: Payment) -> PrintResult<()> {
        self.ensure_open("add a payment to")?;
        if !payment.amount.is_finite() {
            return Err(PrintError::validation("payment amount must be a number"));
        }
        self.payments.push(payment);
        Ok(())
    }

    pub fn add_additional(&mut self, additional: Additional) -> PrintResult<()> {
        self.ensure_open("add a charge to")?;
        self.additionals.push(additional);
        Ok(())
    }

    pub fn add_line(&mut self, text: impl Into<String>) -> PrintResult<()> {
        self.ensure_open("print on")?;
        self.lines.push(text.into());
        Ok(())
    }

    pub fn close(&mut self) -> PrintResult<()> {
        self.ensure_open("close")?;
        self.state = DocumentState::Closed;
        Ok(())
    }

    pub fn cancel(&mut self) -> PrintResult<()> {
        self.ensure_open("cancel")?;
        self.state = DocumentState::Cancelled;
        Ok(())
    }

    /// Items plus surcharges minus discounts, in cents
    pub fn total_cents(&self) -> i64 {
        let total: Decimal = self.items.iter().map(Item::total).sum::<Decimal>()
            + self.additionals.iter().map(Additional::signed).sum::<Decimal>();
        round_cents(total.to_f64().unwrap_or_default())
    }

    pub fn paid_cents(&self) -> i64 {
        let paid: Decimal = self.payments.iter().map(|p| to_decimal(p.amount)).sum();
        round_cents(paid.to_f64().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuit_customer(iva: IvaType) -> Customer {
        Customer {
            name: "ACME SA".into(),
            address: "Calle 1".into(),
            doc_type: DocType::Cuit,
            doc_number: "30-71234567-1".into(),
            iva_type: iva,
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut doc = Document::open(DocumentHeader::ticket()).unwrap();
        doc.add_item(Item::new("Coffee", 2.0, 2.5, 21.0)).unwrap();
        doc.add_payment(Payment::new("Efectivo", 5.0)).unwrap();
        assert_eq!(doc.total_cents(), 500);
        assert_eq!(doc.paid_cents(), 500);

        doc.close().unwrap();
        assert_eq!(doc.state(), DocumentState::Closed);
        assert!(matches!(
            doc.add_item(Item::new("Tea", 1.0, 1.0, 21.0)),
            Err(PrintError::DocumentState(_))
        ));
        assert!(doc.add_payment(Payment::new("x", 1.0)).is_err());
        assert!(doc.cancel().is_err());
    }

    #[test]
    fn test_cancelled_rejects_mutation() {
        let mut doc = Document::open(DocumentHeader::ticket()).unwrap();
        doc.cancel().unwrap();
        assert!(doc.close().is_err());
        assert!(doc
            .add_additional(Additional {
                description: "Recargo".into(),
                amount: 1.0,
                tax_rate: 21.0,
                is_discount: false,
            })
            .is_err());
    }

    #[test]
    fn test_bill_requires_cuit_for_registered_buyer() {
        let header = DocumentHeader::new(DocumentType::Bill)
            .with_letter('a')
            .with_customer(Customer {
                doc_type: DocType::Dni,
                doc_number: "12345678".into(),
                iva_type: IvaType::ResponsableInscripto,
                ..Customer::default()
            });
        let err = Document::open(header).unwrap_err();
        assert_eq!(err.code(), shared::error::ErrorCode::MissingTaxId);

        let header = DocumentHeader::new(DocumentType::Bill)
            .with_letter('A')
            .with_customer(cuit_customer(IvaType::ResponsableInscripto));
        let doc = Document::open(header).unwrap();
        assert_eq!(doc.letter(), Some('A'));
    }

    #[test]
    fn test_final_consumer_needs_no_tax_id() {
        let header =
            DocumentHeader::new(DocumentType::Bill).with_customer(Customer::final_consumer());
        assert!(Document::open(header).is_ok());
    }

    #[test]
    fn test_tax_id_must_be_digits() {
        let mut c = cuit_customer(IvaType::Exento);
        assert!(c.has_valid_tax_id());
        c.doc_number = "30-7123X567-1".into();
        assert!(!c.has_valid_tax_id());
        c.doc_number = " ".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_totals_with_discounts() {
        let mut doc = Document::open(DocumentHeader::ticket()).unwrap();
        doc.add_item(Item::new("A", 1.0, 10.0, 21.0).with_discount("promo", 1.5))
            .unwrap();
        doc.add_item(Item::new("B", 1.0, 2.0, 21.0).negative()).unwrap();
        doc.add_additional(Additional {
            description: "Descuento".into(),
            amount: 0.5,
            tax_rate: 21.0,
            is_discount: true,
        })
        .unwrap();
        assert_eq!(doc.total_cents(), 600);
    }

    #[test]
    fn test_rejects_bad_quantity() {
        let mut doc = Document::open(DocumentHeader::ticket()).unwrap();
        assert!(doc.add_item(Item::new("A", 0.0, 1.0, 21.0)).is_err());
        assert!(doc.add_item(Item::new("A", f64::NAN, 1.0, 21.0)).is_err());
    }

    #[test]
    fn test_description_lines() {
        let mut item = Item::new("last", 1.0, 1.0, 21.0);
        item.description.insert(0, "first".into());
        assert_eq!(item.line(), "last");
        assert_eq!(item.leading_lines(), &["first".to_string()]);
    }

    #[test]
    fn test_iva_type_names() {
        let v: IvaType = serde_json::from_str("\"RESPONSABLE_MONOTRIBUTO\"").unwrap();
        assert_eq!(v, IvaType::Monotributo);
        let v: DocType = serde_json::from_str("\"LIBRETA_CIVICA\"").unwrap();
        assert_eq!(v, DocType::LibretaCivica);
    }
}
