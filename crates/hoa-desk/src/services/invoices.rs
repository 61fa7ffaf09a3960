use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::numbering::next_invoice_number;
use super::occupancy::billing_contact;
use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{
    Invoice, InvoicePenalty, InvoiceSource, InvoiceStatus, Payment, PaymentMethod,
};
use crate::money::Money;
use crate::store::Database;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub unit_id: Option<u64>,
    pub billed_to: Option<u64>,
    pub fee_id: Option<u64>,
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
    /// Matches the invoice number or description.
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub unit_id: u64,
    /// Defaults to the unit's tenant or owner.
    pub billed_to: Option<u64>,
    pub source: Option<InvoiceSource>,
    pub billing_period: Option<String>,
    #[serde(default)]
    pub description: String,
    pub amount: Money,
    /// Defaults to today.
    pub issue_date: Option<NaiveDate>,
    /// Defaults to the issue date plus the configured due days.
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceChanges {
    pub billed_to: Option<u64>,
    #[serde(default)]
    pub description: String,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub billing_period: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub amount: Money,
    pub paid_on: Option<NaiveDate>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPenalty {
    pub amount: Money,
    #[serde(default)]
    pub reason: String,
    pub applied_on: Option<NaiveDate>,
}

/// One penalty added by [`InvoiceService::apply_late_penalties`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatePenaltySummary {
    pub invoice_id: u64,
    pub invoice_number: String,
    pub penalty_id: u64,
    pub amount: Money,
}

#[derive(Clone)]
pub struct InvoiceService {
    context: ServiceContext,
}

impl InvoiceService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Invoices with their status as of today. `scope` limits the listing to
    /// invoices billed to one user.
    pub fn list(
        &self,
        filter: &InvoiceFilter,
        scope: Option<u64>,
    ) -> Result<Page<Invoice>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let today = self.context.today();
        let rows = self.context.store().read(|db| {
            db.invoices
                .active()
                .filter(|invoice| scope.map_or(true, |user| invoice.billed_to == Some(user)))
                .filter(|invoice| filter.unit_id.map_or(true, |id| invoice.unit_id == id))
                .filter(|invoice| filter.billed_to.map_or(true, |id| invoice.billed_to == Some(id)))
                .filter(|invoice| {
                    filter
                        .fee_id
                        .map_or(true, |id| invoice.source == InvoiceSource::Fee { id })
                })
                .filter(|invoice| filter.issued_from.map_or(true, |from| invoice.issue_date >= from))
                .filter(|invoice| filter.issued_to.map_or(true, |to| invoice.issue_date <= to))
                .filter(|invoice| {
                    matches_search(
                        filter.search.as_deref(),
                        &[invoice.invoice_number.as_str(), invoice.description.as_str()],
                    )
                })
                .map(|invoice| as_of(invoice, today))
                .filter(|invoice| filter.status.map_or(true, |status| invoice.status == status))
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<Invoice, ServiceError> {
        let today = self.context.today();
        self.context
            .store()
            .read(|db| require(&db.invoices, id).map(|invoice| as_of(invoice, today)))?
    }

    /// Issue an invoice with the next number for its issue month.
    pub fn create(&self, input: NewInvoice) -> Result<Invoice, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let billing = self.context.billing().clone();

        let invoice = self.context.store().transaction(|db| {
            let issue_date = input.issue_date.unwrap_or(today);
            let due_date = input
                .due_date
                .unwrap_or_else(|| add_days(issue_date, billing.invoice_due_days));
            let source = input.source.unwrap_or_default();

            let mut errors = ValidationErrors::new();
            let description = input.description.trim().to_string();
            errors.required_max("description", &description, 255);
            errors.positive_amount("amount", input.amount);
            if !db.units.contains(input.unit_id) {
                errors.missing_reference("unit_id");
            }
            if input.billed_to.is_some_and(|id| !db.users.contains(id)) {
                errors.missing_reference("billed_to");
            }
            if due_date < issue_date {
                errors.add("due_date", "The due date must be a date after or equal to issue date.");
            }
            check_source(db, &mut errors, source);
            errors.into_result()?;

            let billed_to = input
                .billed_to
                .or_else(|| billing_contact(db, input.unit_id, today));
            let invoice_number = next_invoice_number(db, &billing.invoice_prefix, issue_date);
            let invoice = db.invoices.insert(now, |meta| {
                let mut invoice = Invoice {
                    meta,
                    invoice_number,
                    unit_id: input.unit_id,
                    billed_to,
                    source,
                    billing_period: clean(input.billing_period),
                    description,
                    amount: input.amount,
                    penalty_total: Money::ZERO,
                    amount_paid: Money::ZERO,
                    issue_date,
                    due_date,
                    status: InvoiceStatus::Unpaid,
                    notes: clean(input.notes),
                };
                invoice.status = invoice.derive_status(today);
                invoice
            });
            Ok::<_, ServiceError>(invoice)
        })?;
        info!(
            invoice_id = invoice.meta.id,
            invoice_number = %invoice.invoice_number,
            amount = %invoice.amount,
            "invoice issued"
        );
        Ok(invoice)
    }

    /// Change an open invoice. The amount is locked once payments exist.
    pub fn update(&self, id: u64, changes: InvoiceChanges) -> Result<Invoice, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let invoice = self.context.store().transaction(|db| {
            let current = require(&db.invoices, id)?;
            ensure_open(current)?;

            let mut errors = ValidationErrors::new();
            let description = changes.description.trim().to_string();
            errors.required_max("description", &description, 255);
            errors.positive_amount("amount", changes.amount);
            if changes.amount != current.amount && current.amount_paid.is_positive() {
                errors.add(
                    "amount",
                    "The amount cannot be changed once payments have been recorded.",
                );
            }
            if changes.due_date < current.issue_date {
                errors.add("due_date", "The due date must be a date after or equal to issue date.");
            }
            if changes.billed_to.is_some_and(|user| !db.users.contains(user)) {
                errors.missing_reference("billed_to");
            }
            errors.into_result()?;

            db.invoices
                .update(id, now, |invoice| {
                    invoice.billed_to = changes.billed_to;
                    invoice.description = description;
                    invoice.amount = changes.amount;
                    invoice.due_date = changes.due_date;
                    invoice.billing_period = clean(changes.billing_period);
                    invoice.notes = clean(changes.notes);
                    invoice.status = invoice.derive_status(today);
                })
                .ok_or_else(|| ServiceError::not_found::<Invoice>(id))
        })?;
        info!(invoice_id = id, "invoice updated");
        Ok(invoice)
    }

    /// Cancel an invoice that has not been paid into.
    pub fn cancel(&self, id: u64) -> Result<Invoice, ServiceError> {
        let now = self.context.now();
        let invoice = self.context.store().transaction(|db| {
            let current = require(&db.invoices, id)?;
            ensure_open(current)?;
            if current.amount_paid.is_positive() {
                return Err(ServiceError::invalid(
                    "invoice",
                    "An invoice with recorded payments cannot be cancelled.",
                ));
            }
            db.invoices
                .update(id, now, |invoice| invoice.status = InvoiceStatus::Cancelled)
                .ok_or_else(|| ServiceError::not_found::<Invoice>(id))
        })?;
        info!(invoice_id = id, invoice_number = %invoice.invoice_number, "invoice cancelled");
        Ok(invoice)
    }

    /// Soft delete an invoice without payments. Its number stays reserved.
    pub fn delete(&self, id: u64) -> Result<Invoice, ServiceError> {
        let now = self.context.now();
        let invoice = self.context.store().transaction(|db| {
            require(&db.invoices, id)?;
            if db.payments.active().any(|payment| payment.invoice_id == id) {
                return Err(ServiceError::invalid(
                    "invoice",
                    "An invoice with recorded payments cannot be deleted.",
                ));
            }
            db.invoices
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Invoice>(id))
        })?;
        info!(invoice_id = id, "invoice deleted");
        Ok(invoice)
    }

    pub fn payments(&self, invoice_id: u64) -> Result<Vec<Payment>, ServiceError> {
        self.context.store().read(|db| {
            require(&db.invoices, invoice_id)?;
            Ok(db
                .payments
                .active()
                .filter(|payment| payment.invoice_id == invoice_id)
                .cloned()
                .collect())
        })?
    }

    pub fn payment(&self, id: u64) -> Result<Payment, ServiceError> {
        self.context.store().read(|db| require(&db.payments, id).cloned())?
    }

    /// Record a payment of at most the outstanding balance.
    pub fn record_payment(
        &self,
        invoice_id: u64,
        input: NewPayment,
        received_by: Option<u64>,
    ) -> Result<Payment, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let payment = self.context.store().transaction(|db| {
            let invoice = require(&db.invoices, invoice_id)?;
            ensure_open(invoice)?;

            let mut errors = ValidationErrors::new();
            errors.positive_amount("amount", input.amount);
            let balance = invoice.balance();
            if input.amount > balance {
                errors.add(
                    "amount",
                    format!("The amount may not be greater than the outstanding balance of {balance}."),
                );
            }
            errors.optional_max("reference", input.reference.as_deref(), 100);
            errors.into_result()?;

            let payment = db.payments.insert(now, |meta| Payment {
                meta,
                invoice_id,
                amount: input.amount,
                paid_on: input.paid_on.unwrap_or(today),
                method: input.method,
                reference: clean(input.reference),
                received_by,
                notes: clean(input.notes),
            });
            db.invoices.update(invoice_id, now, |invoice| {
                invoice.amount_paid += payment.amount;
                invoice.status = invoice.derive_status(today);
            });
            Ok::<_, ServiceError>(payment)
        })?;
        info!(
            payment_id = payment.meta.id,
            invoice_id,
            amount = %payment.amount,
            "payment recorded"
        );
        Ok(payment)
    }

    /// Soft delete a payment and restore the invoice balance.
    pub fn delete_payment(&self, id: u64) -> Result<Payment, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let payment = self.context.store().transaction(|db| {
            require(&db.payments, id)?;
            let payment = db
                .payments
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Payment>(id))?;
            db.invoices.update(payment.invoice_id, now, |invoice| {
                invoice.amount_paid = invoice.amount_paid - payment.amount;
                invoice.status = invoice.derive_status(today);
            });
            Ok::<_, ServiceError>(payment)
        })?;
        info!(payment_id = id, invoice_id = payment.invoice_id, "payment deleted");
        Ok(payment)
    }

    pub fn penalties(&self, invoice_id: u64) -> Result<Vec<InvoicePenalty>, ServiceError> {
        self.context.store().read(|db| {
            require(&db.invoices, invoice_id)?;
            Ok(db
                .penalties
                .active()
                .filter(|penalty| penalty.invoice_id == invoice_id)
                .cloned()
                .collect())
        })?
    }

    pub fn penalty(&self, id: u64) -> Result<InvoicePenalty, ServiceError> {
        self.context.store().read(|db| require(&db.penalties, id).cloned())?
    }

    pub fn add_penalty(&self, invoice_id: u64, input: NewPenalty) -> Result<InvoicePenalty, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let penalty = self.context.store().transaction(|db| {
            ensure_open(require(&db.invoices, invoice_id)?)?;
            let mut errors = ValidationErrors::new();
            let reason = input.reason.trim().to_string();
            errors.required_max("reason", &reason, 255);
            errors.positive_amount("amount", input.amount);
            errors.into_result()?;

            let penalty = attach_penalty(
                db,
                invoice_id,
                input.amount,
                reason,
                input.applied_on.unwrap_or(today),
                false,
                today,
                now,
            );
            Ok::<_, ServiceError>(penalty)
        })?;
        info!(penalty_id = penalty.meta.id, invoice_id, amount = %penalty.amount, "penalty added");
        Ok(penalty)
    }

    pub fn delete_penalty(&self, id: u64) -> Result<InvoicePenalty, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let penalty = self.context.store().transaction(|db| {
            require(&db.penalties, id)?;
            let penalty = db
                .penalties
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<InvoicePenalty>(id))?;
            db.invoices.update(penalty.invoice_id, now, |invoice| {
                invoice.penalty_total = invoice.penalty_total - penalty.amount;
                invoice.status = invoice.derive_status(today);
            });
            Ok::<_, ServiceError>(penalty)
        })?;
        info!(penalty_id = id, invoice_id = penalty.invoice_id, "penalty removed");
        Ok(penalty)
    }

    /// Add one automatic late penalty to every invoice overdue past the
    /// grace period that does not carry one yet.
    pub fn apply_late_penalties(&self, today: NaiveDate) -> Result<Vec<LatePenaltySummary>, ServiceError> {
        let now = self.context.now();
        let billing = self.context.billing().clone();
        let applied = self.context.store().transaction::<_, ServiceError>(|db| {
            let due: Vec<(u64, String, Money)> = db
                .invoices
                .active()
                .filter(|invoice| invoice.status != InvoiceStatus::Cancelled)
                .filter(|invoice| invoice.balance().is_positive())
                .filter(|invoice| add_days(invoice.due_date, billing.penalty_grace_days) < today)
                .filter(|invoice| {
                    !db.penalties
                        .active()
                        .any(|penalty| penalty.invoice_id == invoice.meta.id && penalty.automatic)
                })
                .map(|invoice| {
                    let amount = invoice
                        .amount
                        .basis_points(billing.late_fee_bps)
                        .max(Money::from_cents(1));
                    (invoice.meta.id, invoice.invoice_number.clone(), amount)
                })
                .collect();

            let reason = format!(
                "Late payment penalty ({}.{:02}% of the invoice amount)",
                billing.late_fee_bps / 100,
                billing.late_fee_bps % 100
            );
            let mut applied = Vec::with_capacity(due.len());
            for (invoice_id, invoice_number, amount) in due {
                let penalty =
                    attach_penalty(db, invoice_id, amount, reason.clone(), today, true, today, now);
                applied.push(LatePenaltySummary {
                    invoice_id,
                    invoice_number,
                    penalty_id: penalty.meta.id,
                    amount,
                });
            }
            Ok(applied)
        })?;
        info!(count = applied.len(), %today, "late penalties applied");
        Ok(applied)
    }
}

/// The invoice with its status recomputed for `today`.
fn as_of(invoice: &Invoice, today: NaiveDate) -> Invoice {
    let mut invoice = invoice.clone();
    invoice.status = invoice.derive_status(today);
    invoice
}

fn ensure_open(invoice: &Invoice) -> Result<(), ServiceError> {
    if invoice.status == InvoiceStatus::Cancelled {
        Err(ServiceError::invalid("invoice", "The invoice has been cancelled."))
    } else {
        Ok(())
    }
}

fn check_source(db: &Database, errors: &mut ValidationErrors, source: InvoiceSource) {
    match source {
        InvoiceSource::Manual => {}
        InvoiceSource::Fee { id } if db.fees.contains(id) => {}
        InvoiceSource::Lease { id } if db.leases.contains(id) => {}
        InvoiceSource::Fee { .. } | InvoiceSource::Lease { .. } => {
            errors.missing_reference("source")
        }
    }
}

pub(crate) fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

#[allow(clippy::too_many_arguments)]
fn attach_penalty(
    db: &mut Database,
    invoice_id: u64,
    amount: Money,
    reason: String,
    applied_on: NaiveDate,
    automatic: bool,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> InvoicePenalty {
    let penalty = db.penalties.insert(now, |meta| InvoicePenalty {
        meta,
        invoice_id,
        amount,
        reason,
        applied_on,
        automatic,
    });
    db.invoices.update(invoice_id, now, |invoice| {
        invoice.penalty_total += amount;
        invoice.status = invoice.derive_status(today);
    });
    penalty
}
