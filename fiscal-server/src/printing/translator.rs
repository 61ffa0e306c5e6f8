//! Job payload translation
//!
//! Turns the JSON arguments of one operation into adapter calls. Every
//! argument is parsed before the first command is sent, so a malformed job
//! never leaves a half-open document behind.

use fiscal_printer::money;
use fiscal_printer::{
    Additional, Capability, ClosureKind, CommandAdapter, Customer, DocType, DocumentHeader,
    DocumentType, IvaType, Item, Payment, PrintError,
};
use serde_json::{Map, Value, json};
use shared::error::{AppError, AppResult, ErrorKind};
use shared::models::{Brand, JobArgs, JobRequest, OperationKind, PrinterConfig};
use tracing::{debug, info, warn};

const DEFAULT_VAT: f64 = 21.0;

/// Run one job against an adapter the caller holds exclusively
pub async fn execute<A>(adapter: &mut A, printer: &PrinterConfig, request: &JobRequest) -> AppResult<Value>
where
    A: CommandAdapter + ?Sized,
{
    let args = &request.args;
    match request.operation {
        OperationKind::PrintTicket => print_ticket(adapter, named(args, "printTicket")?).await,
        OperationKind::PrintRemito => {
            print_remito(adapter, printer.brand, named(args, "printRemito")?).await
        }
        OperationKind::PrintFacturaElectronica => {
            print_e_invoice(adapter, named(args, "printFacturaElectronica")?).await
        }
        OperationKind::DailyClose => {
            let raw = args.get_str("type", 0).unwrap_or_else(|| "Z".to_string());
            let kind = ClosureKind::parse(&raw)
                .ok_or_else(|| AppError::translation(format!("unknown daily close type '{}'", raw)))?;
            let report = adapter.daily_close(kind).await?;
            info!(kind = kind.as_str(), "Daily close printed");
            Ok(to_json(&report))
        }
        OperationKind::OpenDrawer => {
            adapter.open_drawer().await?;
            Ok(json!({"drawer": "opened"}))
        }
        OperationKind::GetStatus => {
            let status = match adapter.status().await {
                Ok(status) => to_json(&status),
                Err(PrintError::Unsupported(_)) => Value::Null,
                Err(e) => return Err(e.into()),
            };
            Ok(json!({
                "printer": {
                    "name": printer.name,
                    "brand": printer.brand,
                    "model": printer.model,
                    "driver": printer.driver.kind(),
                },
                "status": status,
            }))
        }
        OperationKind::CancelDocument => {
            let open = adapter.document().is_some_and(|d| d.is_open());
            if open {
                adapter.cancel_document().await?;
                Ok(json!({"cancelled": true}))
            } else {
                let recovery = adapter.cancel_any_document().await?;
                Ok(json!({"cancelled": true, "recovery": recovery}))
            }
        }
        OperationKind::SetHeader => {
            let lines = lines_arg(args)?;
            adapter.set_header(&lines).await?;
            Ok(json!({"lines": lines.len()}))
        }
        OperationKind::SetTrailer => {
            let lines = lines_arg(args)?;
            adapter.set_trailer(&lines).await?;
            Ok(json!({"lines": lines.len()}))
        }
        OperationKind::GetLastNumber => {
            let code = args
                .get_str("tipo_cbte", 0)
                .ok_or_else(|| AppError::translation("getLastNumber needs a document type"))?;
            let (doc_type, letter) = parse_document_code(&code)?;
            let number = adapter.last_number(doc_type, letter).await?;
            Ok(json!({"lastNumber": number}))
        }
    }
}

// ========== printTicket ==========

#[derive(Debug, Clone, PartialEq)]
pub struct TicketJob {
    pub header: DocumentHeader,
    pub items: Vec<Item>,
    pub payments: Vec<Payment>,
    pub additionals: Vec<Additional>,
    pub header_lines: Option<Vec<String>>,
    pub trailer_lines: Option<Vec<String>>,
}

impl TicketJob {
    pub fn parse(args: &Map<String, Value>) -> AppResult<Self> {
        let encabezado = match args.get("encabezado") {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(AppError::translation("encabezado must be an object")),
            None => return Err(AppError::translation("printTicket needs an encabezado")),
        };
        let header = parse_header(encabezado)?;

        let items = list(args, "items")?
            .into_iter()
            .map(parse_item)
            .collect::<AppResult<Vec<_>>>()?;
        let payments = list(args, "pagos")?
            .into_iter()
            .map(parse_payment)
            .collect::<AppResult<Vec<_>>>()?;
        let additionals = list(args, "addAdditional")?
            .into_iter()
            .map(parse_additional)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            header,
            items,
            payments,
            additionals,
            header_lines: args.get("setHeader").map(string_list).transpose()?,
            trailer_lines: args.get("setTrailer").map(string_list).transpose()?,
        })
    }
}

async fn print_ticket<A>(adapter: &mut A, args: &Map<String, Value>) -> AppResult<Value>
where
    A: CommandAdapter + ?Sized,
{
    let job = TicketJob::parse(args)?;

    if let Some(lines) = &job.header_lines {
        adapter.set_header(lines).await?;
    }
    if let Some(lines) = &job.trailer_lines {
        adapter.set_trailer(lines).await?;
    }

    let doc_type = job.header.doc_type;
    open_with_recovery(adapter, job.header).await?;

    let filled = fill(adapter, job.items, job.payments, job.additionals).await;
    let number = match filled {
        Ok(()) => adapter.close_document().await,
        Err(e) => Err(e),
    };

    match number {
        Ok(number) => {
            info!(?doc_type, number = %number, "Document printed");
            Ok(json!({"documentNumber": number, "documentType": doc_type}))
        }
        Err(e) => {
            abandon(adapter).await;
            Err(e.into())
        }
    }
}

/// Open a document, clearing a stale one first; a failed open that was
/// not a validation error is retried once after recovery
async fn open_with_recovery<A>(adapter: &mut A, header: DocumentHeader) -> AppResult<()>
where
    A: CommandAdapter + ?Sized,
{
    if adapter.document().is_some_and(|d| d.is_open()) {
        warn!("Document left open by an earlier job, recovering");
        adapter.cancel_any_document().await?;
    }

    match adapter.open_document(header.clone()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::Validation || matches!(e, PrintError::Unsupported(_)) => {
            Err(e.into())
        }
        Err(e) => {
            warn!(error = %e, "Open failed, recovering and retrying once");
            adapter.cancel_any_document().await?;
            adapter.open_document(header).await?;
            Ok(())
        }
    }
}

async fn fill<A>(
    adapter: &mut A,
    items: Vec<Item>,
    payments: Vec<Payment>,
    additionals: Vec<Additional>,
) -> Result<(), PrintError>
where
    A: CommandAdapter + ?Sized,
{
    for item in items {
        adapter.add_item(item).await?;
    }
    for additional in additionals {
        adapter.add_additional_charge(additional).await?;
    }
    for payment in payments {
        adapter.add_payment(payment).await?;
    }
    Ok(())
}

/// Cancel after a mid-document failure; the original error is what the
/// caller sees
async fn abandon<A>(adapter: &mut A)
where
    A: CommandAdapter + ?Sized,
{
    if !adapter.document().is_some_and(|d| d.is_open()) {
        return;
    }
    if let Err(e) = adapter.cancel_document().await {
        warn!(error = %e, "Could not cancel the failed document");
    }
}

// ========== printRemito ==========

async fn print_remito<A>(adapter: &mut A, brand: Brand, args: &Map<String, Value>) -> AppResult<Value>
where
    A: CommandAdapter + ?Sized,
{
    let customer = match args.get("encabezado") {
        Some(Value::Object(map)) => parse_customer(map)?,
        _ => Customer::final_consumer(),
    };
    let copies = args
        .get("copias")
        .and_then(number)
        .map(|n| n.max(1.0) as u32)
        .unwrap_or(1);
    let items = list(args, "items")?
        .iter()
        .map(|v| {
            let map = object(v, "remito item")?;
            let description = text(map, "ds")?;
            let quantity = opt_number(map, "qty")?.unwrap_or(1.0);
            Ok((description, quantity))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let header = DocumentHeader::new(DocumentType::Remit)
        .with_customer(customer)
        .with_copies(copies);

    // Epson has no remit document; the same lines go on a non-fiscal one
    let as_remit = brand != Brand::Epson || adapter.capability() == Capability::Receipt;
    debug!(as_remit, items = items.len(), "Printing remit");

    let result = if as_remit {
        remit_document(adapter, header, &items).await
    } else {
        text_document(adapter, remit_lines(&items)).await
    };
    match result {
        Ok(number) => Ok(json!({"documentNumber": number, "documentType": DocumentType::Remit})),
        Err(e) => {
            abandon(adapter).await;
            Err(e.into())
        }
    }
}

async fn remit_document<A>(
    adapter: &mut A,
    header: DocumentHeader,
    items: &[(String, f64)],
) -> Result<String, PrintError>
where
    A: CommandAdapter + ?Sized,
{
    let receipt = adapter.capability() == Capability::Receipt;
    adapter.open_document(header).await?;
    for (description, quantity) in items {
        if receipt {
            adapter
                .add_item(Item::new(description.clone(), *quantity, 0.0, 0.0))
                .await?;
        } else {
            adapter.add_remit_item(description, *quantity).await?;
        }
    }
    adapter.close_document().await
}

fn remit_lines(items: &[(String, f64)]) -> Vec<String> {
    let mut lines = vec!["REMITO".to_string(), String::new()];
    for (description, quantity) in items {
        lines.push(format!("{} x {}", money::plain(*quantity), description));
    }
    lines
}

async fn text_document<A>(adapter: &mut A, lines: Vec<String>) -> Result<String, PrintError>
where
    A: CommandAdapter + ?Sized,
{
    adapter
        .open_document(DocumentHeader::new(DocumentType::NonFiscal))
        .await?;
    for line in &lines {
        adapter.print_text(line).await?;
    }
    adapter.close_document().await
}

// ========== printFacturaElectronica ==========

/// Lines for an e-invoice authorized elsewhere; only its rendering happens
/// here
pub fn e_invoice_lines(args: &Map<String, Value>) -> AppResult<Vec<String>> {
    let encabezado = match args.get("encabezado") {
        Some(Value::Object(map)) => map,
        _ => return Err(AppError::translation("printFacturaElectronica needs an encabezado")),
    };
    let items = list(args, "items")?;
    if items.is_empty() {
        return Err(AppError::translation("printFacturaElectronica needs items"));
    }

    let field = |key: &str| encabezado.get(key).and_then(scalar_text);
    let mut lines = Vec::new();
    for key in ["nombre_comercio", "razon_social"] {
        if let Some(v) = field(key) {
            lines.push(v);
        }
    }
    if let Some(cuit) = field("cuit_empresa") {
        lines.push(format!("CUIT: {}", cuit));
    }
    if let Some(iibb) = field("ingresos_brutos") {
        lines.push(format!("Ingresos Brutos: {}", iibb));
    }
    if let Some(v) = field("domicilio_comercial") {
        lines.push(v);
    }
    if let Some(v) = field("inicio_actividades") {
        lines.push(format!("Inicio de actividades: {}", v));
    }
    if let Some(v) = field("tipo_responsable") {
        lines.push(v);
    }
    lines.push(String::new());
    lines.push(format!(
        "{} Nro. {}",
        field("tipo_comprobante").unwrap_or_else(|| "Factura".into()),
        field("numero_comprobante").unwrap_or_default()
    ));
    if let Some(date) = field("fecha_comprobante") {
        lines.push(format!("Fecha {}", date));
    }
    match field("nombre_cliente") {
        Some(name) => {
            lines.push(format!("A {}", name));
            if let (Some(kind), Some(doc)) = (field("nombre_tipo_documento"), field("documento_cliente")) {
                lines.push(format!("{}: {}", kind, doc));
            }
            if let Some(address) = field("domicilio_cliente") {
                lines.push(address);
            }
        }
        None => lines.push("A Consumidor Final".into()),
    }
    lines.push(String::new());

    let mut total = 0i64;
    for value in items {
        let item = parse_item(value)?;
        let line_total = item.total();
        total += money::cents(line_total);
        lines.push(format!(
            "{} x {} ({}%)",
            money::plain(item.quantity),
            money::plain(item.unit_price),
            money::plain(item.tax_rate)
        ));
        lines.push(format!("{}  {}", item.line(), money::fixed(line_total, 2)));
    }
    lines.push(String::new());
    lines.push(format!("TOTAL {}", money::fixed(money::from_cents(total), 2)));

    if let Some(cae) = field("cae") {
        lines.push(format!("CAE: {}", cae));
    }
    if let Some(due) = field("cae_vto") {
        lines.push(format!("Vto. CAE: {}", due));
    }
    Ok(lines)
}

async fn print_e_invoice<A>(adapter: &mut A, args: &Map<String, Value>) -> AppResult<Value>
where
    A: CommandAdapter + ?Sized,
{
    let lines = e_invoice_lines(args)?;
    if let Some(trailer) = args.get("setTrailer").map(string_list).transpose()? {
        adapter.set_trailer(&trailer).await?;
    }
    match text_document(adapter, lines).await {
        Ok(number) => Ok(json!({"documentNumber": number})),
        Err(e) => {
            abandon(adapter).await;
            Err(e.into())
        }
    }
}

// ========== Field parsing ==========

/// `T`, `F`, `ND`, `NC`, optionally followed by the letter (`FA`, `NCB`)
pub fn parse_document_code(code: &str) -> AppResult<(DocumentType, Option<char>)> {
    let code = code.trim().to_ascii_uppercase();
    let (doc_type, rest) = if let Some(rest) = code.strip_prefix("NC") {
        (DocumentType::CreditNote, rest)
    } else if let Some(rest) = code.strip_prefix("ND") {
        (DocumentType::DebitNote, rest)
    } else if let Some(rest) = code.strip_prefix('T') {
        (DocumentType::Ticket, rest)
    } else if let Some(rest) = code.strip_prefix('F') {
        (DocumentType::Bill, rest)
    } else {
        return Err(AppError::translation(format!("unknown document type '{}'", code)));
    };

    let letter = rest.trim_start_matches(['-', ' ', '_']).chars().next();
    match letter {
        None => Ok((doc_type, None)),
        Some(l @ ('A' | 'B' | 'C' | 'M')) => Ok((doc_type, Some(l))),
        Some(other) => Err(AppError::translation(format!(
            "unknown letter '{}' in document type '{}'",
            other, code
        ))),
    }
}

/// Tax category by name (`RESPONSABLE_INSCRIPTO`, `IVA_TYPE_EXENTO`) or
/// by numeric code
pub fn parse_iva_type(value: &Value) -> AppResult<IvaType> {
    if let Some(code) = integer(value) {
        return match code {
            1 => Ok(IvaType::ResponsableInscripto),
            2 => Ok(IvaType::ResponsableNoInscripto),
            3 => Ok(IvaType::NoResponsable),
            4 => Ok(IvaType::Exento),
            5 => Ok(IvaType::ConsumidorFinal),
            6 => Ok(IvaType::Monotributo),
            7 => Ok(IvaType::NoCategorizado),
            12 => Ok(IvaType::Eventual),
            13 => Ok(IvaType::MonotributoSocial),
            14 => Ok(IvaType::EventualSocial),
            other => Err(AppError::translation(format!("unknown tax category code {}", other))),
        };
    }
    let name = value
        .as_str()
        .ok_or_else(|| AppError::translation("tipo_responsable must be a string or a code"))?;
    let name = name.trim().to_ascii_uppercase();
    let name = name.strip_prefix("IVA_TYPE_").unwrap_or(&name);
    serde_json::from_value(Value::String(name.to_string()))
        .map_err(|_| AppError::translation(format!("unknown tax category '{}'", name)))
}

/// Identity document by name (`CUIT`, `DNI`) or by numeric code
pub fn parse_doc_type(value: &Value) -> AppResult<DocType> {
    if let Some(code) = integer(value) {
        return match code {
            80 => Ok(DocType::Cuit),
            89 => Ok(DocType::LibretaEnrolamiento),
            90 => Ok(DocType::LibretaCivica),
            96 => Ok(DocType::Dni),
            94 => Ok(DocType::Pasaporte),
            0 => Ok(DocType::Cedula),
            99 => Ok(DocType::SinCalificador),
            other => Err(AppError::translation(format!("unknown document code {}", other))),
        };
    }
    let name = value
        .as_str()
        .ok_or_else(|| AppError::translation("tipo_doc must be a string or a code"))?;
    let name = name.trim().to_ascii_uppercase();
    let name = name.strip_prefix("TIPO_").unwrap_or(&name);
    serde_json::from_value(Value::String(name.to_string()))
        .map_err(|_| AppError::translation(format!("unknown document type '{}'", name)))
}

fn parse_customer(map: &Map<String, Value>) -> AppResult<Customer> {
    let mut customer = Customer::final_consumer();
    if let Some(v) = map.get("tipo_responsable") {
        customer.iva_type = parse_iva_type(v)?;
    }
    if let Some(v) = map.get("tipo_doc") {
        customer.doc_type = parse_doc_type(v)?;
    }
    if let Some(v) = map.get("nro_doc").and_then(scalar_text) {
        customer.doc_number = v;
    }
    if let Some(v) = map.get("nombre_cliente").and_then(scalar_text) {
        customer.name = v;
    }
    if let Some(v) = map.get("domicilio_cliente").and_then(scalar_text) {
        customer.address = v;
    }
    Ok(customer)
}

fn parse_header(map: &Map<String, Value>) -> AppResult<DocumentHeader> {
    let code = map
        .get("tipo_cbte")
        .and_then(scalar_text)
        .ok_or_else(|| AppError::translation("encabezado needs tipo_cbte"))?;
    let (doc_type, letter) = parse_document_code(&code)?;

    let mut header = DocumentHeader::new(doc_type).with_customer(parse_customer(map)?);
    if let Some(letter) = letter {
        header = header.with_letter(letter);
    }
    if let Some(reference) = map.get("referencia").and_then(scalar_text) {
        header = header.with_reference(reference);
    }
    Ok(header)
}

fn parse_item(value: &Value) -> AppResult<Item> {
    let map = object(value, "item")?;
    let description = text(map, "ds")?;
    let quantity = opt_number(map, "qty")?.unwrap_or(1.0);
    let price = opt_number(map, "importe")?
        .ok_or_else(|| AppError::translation(format!("item '{}' has no importe", description)))?;
    let vat = opt_number(map, "alic_iva")?.unwrap_or(DEFAULT_VAT);

    let mut item = Item::new(description, quantity, price.abs(), vat);
    if price < 0.0 {
        item = item.negative();
    }
    if let Some(discount) = opt_number(map, "discount")?.filter(|d| *d != 0.0) {
        let label = map
            .get("discountDescription")
            .and_then(scalar_text)
            .unwrap_or_else(|| "Descuento".to_string());
        item = item.with_discount(label, discount.abs());
    }
    item.validate()?;
    Ok(item)
}

fn parse_payment(value: &Value) -> AppResult<Payment> {
    let map = object(value, "pago")?;
    let description = map
        .get("ds")
        .and_then(scalar_text)
        .unwrap_or_else(|| "Efectivo".to_string());
    let amount = opt_number(map, "importe")?
        .ok_or_else(|| AppError::translation(format!("payment '{}' has no importe", description)))?;
    Ok(Payment::new(description, amount))
}

fn parse_additional(value: &Value) -> AppResult<Additional> {
    let map = object(value, "addAdditional")?;
    let description = text(map, "description")?;
    let amount = opt_number(map, "amount")?
        .ok_or_else(|| AppError::translation(format!("additional '{}' has no amount", description)))?;
    let negative = match map.get("negative") {
        Some(Value::Bool(b)) => *b,
        Some(other) => integer(other).is_some_and(|n| n != 0),
        None => amount < 0.0,
    };
    Ok(Additional {
        description,
        amount: amount.abs(),
        tax_rate: opt_number(map, "iva")?.unwrap_or(DEFAULT_VAT),
        is_discount: negative,
    })
}

// ========== Value helpers ==========

fn named<'a>(args: &'a JobArgs, op: &str) -> AppResult<&'a Map<String, Value>> {
    args.as_named()
        .ok_or_else(|| AppError::translation(format!("{} takes named arguments", op)))
}

fn object<'a>(value: &'a Value, what: &str) -> AppResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| AppError::translation(format!("{} must be an object", what)))
}

/// Missing and null are an empty list; a single object is a list of one
fn list<'a>(args: &'a Map<String, Value>, key: &str) -> AppResult<Vec<&'a Value>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(obj @ Value::Object(_)) => Ok(vec![obj]),
        Some(_) => Err(AppError::translation(format!("{} must be a list", key))),
    }
}

fn string_list(value: &Value) -> AppResult<Vec<String>> {
    match value {
        Value::Array(items) => Ok(items.iter().map(|v| scalar_text(v).unwrap_or_default()).collect()),
        Value::String(s) => Ok(vec![s.clone()]),
        _ => Err(AppError::translation("expected a list of lines")),
    }
}

fn lines_arg(args: &JobArgs) -> AppResult<Vec<String>> {
    match args {
        JobArgs::Positional(items) => string_list(&Value::Array(items.clone())),
        JobArgs::Named(map) => match map.get("lines") {
            Some(v) => string_list(v),
            None => Err(AppError::translation("expected a list of lines")),
        },
    }
}

fn text(map: &Map<String, Value>, key: &str) -> AppResult<String> {
    map.get(key)
        .and_then(scalar_text)
        .ok_or_else(|| AppError::translation(format!("missing '{}'", key)))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

fn opt_number(map: &Map<String, Value>, key: &str) -> AppResult<Option<f64>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number(v)
            .map(Some)
            .ok_or_else(|| AppError::translation(format!("'{}' is not a number", key))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
