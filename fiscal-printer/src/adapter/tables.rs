//! Per-brand code tables
//!
//! Plain `match` tables kept apart from the command logic so each can be
//! checked on its own.

use crate::document::{DocType, IvaType};

pub mod epson {
    use super::*;

    pub fn iva_code(iva: IvaType) -> &'static str {
        match iva {
            IvaType::ResponsableInscripto => "I",
            IvaType::ResponsableNoInscripto | IvaType::BienesDeUso => "R",
            IvaType::Exento => "E",
            IvaType::NoResponsable => "N",
            IvaType::Monotributo | IvaType::MonotributoSocial => "M",
            IvaType::ConsumidorFinal
            | IvaType::Eventual
            | IvaType::EventualSocial
            | IvaType::NoCategorizado => "F",
        }
    }

    /// Printed name of the buyer's document
    pub fn doc_type_name(doc: DocType) -> &'static str {
        match doc {
            DocType::Cuit => "CUIT",
            DocType::LibretaEnrolamiento => "L.E.",
            DocType::LibretaCivica => "L.C.",
            DocType::Dni => "DNI",
            DocType::Pasaporte => "PASAP",
            DocType::Cedula => "CED",
            DocType::SinCalificador => "S/C",
        }
    }
}

pub mod hasar {
    use super::*;

    pub fn iva_code(iva: IvaType) -> &'static str {
        match iva {
            IvaType::ResponsableInscripto => "I",
            IvaType::ResponsableNoInscripto => "N",
            IvaType::Exento => "E",
            IvaType::NoResponsable => "A",
            IvaType::ConsumidorFinal => "C",
            IvaType::BienesDeUso => "B",
            IvaType::Monotributo => "M",
            IvaType::MonotributoSocial => "S",
            IvaType::Eventual => "V",
            IvaType::EventualSocial => "W",
            IvaType::NoCategorizado => "T",
        }
    }

    pub fn doc_type_code(doc: DocType) -> &'static str {
        match doc {
            DocType::Cuit => "C",
            DocType::LibretaEnrolamiento => "0",
            DocType::LibretaCivica => "1",
            DocType::Dni => "2",
            DocType::Pasaporte => "3",
            DocType::Cedula => "4",
            DocType::SinCalificador => " ",
        }
    }

    /// Where a text ends up on the printout
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TextContext {
        NonFiscalText,
        CustomerName,
        CustomerAddress,
        PaymentDescription,
        FiscalText,
        LineItem,
        LastItemDiscount,
        GeneralDiscount,
        EmbarkItem,
        ReceiptText,
        DiscountDescription,
    }

    /// Column budget per context: (615 layout, 320 layout)
    pub fn text_width(context: TextContext, wide: bool) -> usize {
        let (narrow_width, wide_width) = match context {
            TextContext::NonFiscalText => (40, 120),
            TextContext::CustomerName => (30, 50),
            TextContext::CustomerAddress => (40, 50),
            TextContext::PaymentDescription => (30, 50),
            TextContext::FiscalText
            | TextContext::LineItem
            | TextContext::LastItemDiscount
            | TextContext::GeneralDiscount => (20, 50),
            TextContext::EmbarkItem => (108, 108),
            TextContext::ReceiptText => (106, 106),
            TextContext::DiscountDescription => (20, 20),
        };
        if wide { wide_width } else { narrow_width }
    }
}
