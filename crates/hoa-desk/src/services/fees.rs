use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::invoices::add_days;
use super::numbering::next_invoice_number;
use super::occupancy::billing_contact;
use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{
    Fee, FeeFrequency, FeeScope, FeeStatus, Invoice, InvoiceSource, InvoiceStatus, UnitStatus,
};
use crate::money::Money;
use crate::store::Database;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeFilter {
    pub status: Option<FeeStatus>,
    pub frequency: Option<FeeFrequency>,
    pub building_id: Option<u64>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeInput {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    /// `None` bills every building.
    pub building_id: Option<u64>,
    pub amount: Money,
    pub frequency: FeeFrequency,
    #[serde(default)]
    pub applies_to: FeeScope,
    #[serde(default)]
    pub status: FeeStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Defaults to the configured invoice due days.
    pub due_in_days: Option<u32>,
}

/// Outcome of one fee in a [`FeeService::process_recurring`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeRunSummary {
    pub fee_id: u64,
    pub fee_name: String,
    pub period: String,
    pub invoices_created: usize,
    /// Units that already had an invoice for this fee and period.
    pub units_skipped: usize,
    pub already_billed: bool,
}

#[derive(Clone)]
pub struct FeeService {
    context: ServiceContext,
}

impl FeeService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn list(&self, filter: &FeeFilter) -> Result<Page<Fee>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.fees
                .active()
                .filter(|fee| filter.status.map_or(true, |status| fee.status == status))
                .filter(|fee| filter.frequency.map_or(true, |frequency| fee.frequency == frequency))
                .filter(|fee| filter.building_id.map_or(true, |id| fee.building_id == Some(id)))
                .filter(|fee| {
                    matches_search(
                        filter.search.as_deref(),
                        &[fee.name.as_str(), fee.description.as_deref().unwrap_or_default()],
                    )
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<Fee, ServiceError> {
        self.context.store().read(|db| require(&db.fees, id).cloned())?
    }

    pub fn create(&self, input: FeeInput) -> Result<Fee, ServiceError> {
        let now = self.context.now();
        let default_due = self.context.billing().invoice_due_days;
        let fee = self.context.store().transaction(|db| {
            let input = validate(db, input, None)?;
            Ok::<_, ServiceError>(db.fees.insert(now, |meta| Fee {
                meta,
                name: input.name,
                description: input.description,
                building_id: input.building_id,
                amount: input.amount,
                frequency: input.frequency,
                applies_to: input.applies_to,
                status: input.status,
                start_date: input.start_date,
                end_date: input.end_date,
                due_in_days: input.due_in_days.unwrap_or(default_due),
                last_billed_period: None,
                last_processed_at: None,
            }))
        })?;
        info!(fee_id = fee.meta.id, name = %fee.name, "fee created");
        Ok(fee)
    }

    pub fn update(&self, id: u64, input: FeeInput) -> Result<Fee, ServiceError> {
        let now = self.context.now();
        let default_due = self.context.billing().invoice_due_days;
        let fee = self.context.store().transaction(|db| {
            require(&db.fees, id)?;
            let input = validate(db, input, Some(id))?;
            db.fees
                .update(id, now, |fee| {
                    fee.name = input.name;
                    fee.description = input.description;
                    fee.building_id = input.building_id;
                    fee.amount = input.amount;
                    fee.frequency = input.frequency;
                    fee.applies_to = input.applies_to;
                    fee.status = input.status;
                    fee.start_date = input.start_date;
                    fee.end_date = input.end_date;
                    fee.due_in_days = input.due_in_days.unwrap_or(default_due);
                })
                .ok_or_else(|| ServiceError::not_found::<Fee>(id))
        })?;
        info!(fee_id = id, "fee updated");
        Ok(fee)
    }

    pub fn delete(&self, id: u64) -> Result<Fee, ServiceError> {
        let now = self.context.now();
        let fee = self.context.store().transaction(|db| {
            require(&db.fees, id)?;
            db.fees
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Fee>(id))
        })?;
        info!(fee_id = id, "fee deleted");
        Ok(fee)
    }

    /// Bill every active fee for the period containing `today`.
    ///
    /// Idempotent per fee and period: a fee already billed for the current
    /// period is skipped, and a unit that already holds an invoice for the
    /// fee and period is never billed twice. The whole run commits or fails
    /// as one transaction.
    pub fn process_recurring(&self, today: NaiveDate) -> Result<Vec<FeeRunSummary>, ServiceError> {
        let now = self.context.now();
        let prefix = self.context.billing().invoice_prefix.clone();

        let summaries = self.context.store().transaction::<_, ServiceError>(|db| {
            let fees: Vec<Fee> = db
                .fees
                .active()
                .filter(|fee| fee.is_billable_on(today))
                .cloned()
                .collect();

            let mut summaries = Vec::with_capacity(fees.len());
            for fee in fees {
                let period = fee.frequency.period_key(today);
                if fee.last_billed_period.as_deref() == Some(period.as_str()) {
                    debug!(fee_id = fee.meta.id, %period, "fee already billed for period");
                    summaries.push(FeeRunSummary {
                        fee_id: fee.meta.id,
                        fee_name: fee.name.clone(),
                        period,
                        invoices_created: 0,
                        units_skipped: 0,
                        already_billed: true,
                    });
                    continue;
                }

                let mut created = 0;
                let mut skipped = 0;
                for unit_id in billable_units(db, &fee) {
                    if has_fee_invoice(db, fee.meta.id, unit_id, &period) {
                        skipped += 1;
                        continue;
                    }
                    let billed_to = billing_contact(db, unit_id, today);
                    let invoice_number = next_invoice_number(db, &prefix, today);
                    let description = format!("{} ({period})", fee.name);
                    db.invoices.insert(now, |meta| Invoice {
                        meta,
                        invoice_number,
                        unit_id,
                        billed_to,
                        source: InvoiceSource::Fee { id: fee.meta.id },
                        billing_period: Some(period.clone()),
                        description,
                        amount: fee.amount,
                        penalty_total: Money::ZERO,
                        amount_paid: Money::ZERO,
                        issue_date: today,
                        due_date: add_days(today, fee.due_in_days),
                        status: InvoiceStatus::Unpaid,
                        notes: None,
                    });
                    created += 1;
                }

                db.fees.update(fee.meta.id, now, |stored| {
                    stored.last_billed_period = Some(period.clone());
                    stored.last_processed_at = Some(now);
                });
                info!(
                    fee_id = fee.meta.id,
                    %period,
                    invoices_created = created,
                    units_skipped = skipped,
                    "fee billed"
                );
                summaries.push(FeeRunSummary {
                    fee_id: fee.meta.id,
                    fee_name: fee.name,
                    period,
                    invoices_created: created,
                    units_skipped: skipped,
                    already_billed: false,
                });
            }
            Ok(summaries)
        })?;
        Ok(summaries)
    }
}

/// Units the fee applies to, in id order.
fn billable_units(db: &Database, fee: &Fee) -> Vec<u64> {
    db.units
        .active()
        .filter(|unit| fee.building_id.map_or(true, |id| unit.building_id == id))
        .filter(|unit| fee.applies_to == FeeScope::AllUnits || unit.status != UnitStatus::Vacant)
        .map(|unit| unit.meta.id)
        .collect()
}

fn has_fee_invoice(db: &Database, fee_id: u64, unit_id: u64, period: &str) -> bool {
    db.invoices.active().any(|invoice| {
        invoice.unit_id == unit_id
            && invoice.source == InvoiceSource::Fee { id: fee_id }
            && invoice.billing_period.as_deref() == Some(period)
    })
}

fn validate(db: &Database, input: FeeInput, current: Option<u64>) -> Result<FeeInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = input.name.trim().to_string();
    errors.required_max("name", &name, 255);
    errors.positive_amount("amount", input.amount);
    if input.building_id.is_some_and(|id| !db.buildings.contains(id)) {
        errors.missing_reference("building_id");
    }
    if input.end_date.is_some_and(|end| end < input.start_date) {
        errors.add("end_date", "The end date must be a date after or equal to start date.");
    }
    if input.due_in_days.is_some_and(|days| days > 365) {
        errors.add("due_in_days", "The due in days may not be greater than 365.");
    }
    if !name.is_empty()
        && db
            .fees
            .active()
            .any(|fee| Some(fee.meta.id) != current && fee.name.eq_ignore_ascii_case(&name))
    {
        errors.taken("name");
    }
    errors.into_result()?;

    Ok(FeeInput {
        name,
        description: clean(input.description),
        ..input
    })
}
