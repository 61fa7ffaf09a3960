//! CSV exports for accountants.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::domain::InvoiceStatus;
use crate::store::{Store, StoreError};

#[derive(Debug)]
pub enum ExportError {
    Store(StoreError),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Store(err) => write!(f, "failed to read invoices: {}", err),
            ExportError::Csv(err) => write!(f, "failed to write invoice CSV: {}", err),
            ExportError::Io(err) => write!(f, "failed to flush invoice CSV: {}", err),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Store(err) => Some(err),
            ExportError::Csv(err) => Some(err),
            ExportError::Io(err) => Some(err),
        }
    }
}

impl From<StoreError> for ExportError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Which invoices to export. Statuses are evaluated as of the export date.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceExportFilter {
    pub status: Option<InvoiceStatus>,
    pub unit_id: Option<u64>,
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
}

const HEADER: [&str; 11] = [
    "invoice_number",
    "unit",
    "building",
    "billed_to",
    "issue_date",
    "due_date",
    "amount",
    "penalties",
    "paid",
    "balance",
    "status",
];

#[derive(Debug, Serialize)]
struct InvoiceRow<'a> {
    invoice_number: &'a str,
    unit: &'a str,
    building: &'a str,
    billed_to: &'a str,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    amount: String,
    penalties: String,
    paid: String,
    balance: String,
    status: &'static str,
}

/// Write one row per live invoice, in invoice id order. Returns the row count.
///
/// `scope` restricts the export to invoices billed to one user.
pub fn write_invoices_csv<W: Write>(
    store: &Store,
    today: NaiveDate,
    filter: &InvoiceExportFilter,
    scope: Option<u64>,
    writer: W,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv_writer.write_record(HEADER)?;

    let rows = store.read(|db| -> Result<usize, csv::Error> {
        let mut rows = 0;
        for invoice in db.invoices.active() {
            let status = invoice.derive_status(today);
            if scope.is_some_and(|user| invoice.billed_to != Some(user))
                || filter.status.is_some_and(|wanted| wanted != status)
                || filter.unit_id.is_some_and(|id| invoice.unit_id != id)
                || filter.issued_from.is_some_and(|from| invoice.issue_date < from)
                || filter.issued_to.is_some_and(|to| invoice.issue_date > to)
            {
                continue;
            }

            let unit = db.units.find_with_trashed(invoice.unit_id);
            let building = unit.and_then(|unit| db.buildings.find_with_trashed(unit.building_id));
            let billed_to = invoice
                .billed_to
                .and_then(|id| db.users.find_with_trashed(id));

            csv_writer.serialize(InvoiceRow {
                invoice_number: &invoice.invoice_number,
                unit: unit.map_or("", |unit| unit.unit_number.as_str()),
                building: building.map_or("", |building| building.name.as_str()),
                billed_to: billed_to.map_or("", |user| user.name.as_str()),
                issue_date: invoice.issue_date,
                due_date: invoice.due_date,
                amount: invoice.amount.to_string(),
                penalties: invoice.penalty_total.to_string(),
                paid: invoice.amount_paid.to_string(),
                balance: invoice.balance().to_string(),
                status: status.label(),
            })?;
            rows += 1;
        }
        Ok(rows)
    })??;

    csv_writer.flush()?;
    Ok(rows)
}

/// [`write_invoices_csv`] into memory.
pub fn invoices_csv(
    store: &Store,
    today: NaiveDate,
    filter: &InvoiceExportFilter,
    scope: Option<u64>,
) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    write_invoices_csv(store, today, filter, scope, &mut buffer)?;
    Ok(buffer)
}
