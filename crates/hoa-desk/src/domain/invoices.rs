use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::store::{impl_record, RecordMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

/// What an invoice bills for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvoiceSource {
    #[default]
    Manual,
    Fee {
        id: u64,
    },
    Lease {
        id: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub invoice_number: String,
    pub unit_id: u64,
    pub billed_to: Option<u64>,
    pub source: InvoiceSource,
    pub billing_period: Option<String>,
    pub description: String,
    pub amount: Money,
    pub penalty_total: Money,
    pub amount_paid: Money,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
}

impl Invoice {
    pub fn total_due(&self) -> Money {
        self.amount + self.penalty_total
    }

    pub fn balance(&self) -> Money {
        self.total_due() - self.amount_paid
    }

    /// Status implied by the amounts and the due date.
    pub fn derive_status(&self, today: NaiveDate) -> InvoiceStatus {
        if self.status == InvoiceStatus::Cancelled {
            InvoiceStatus::Cancelled
        } else if !self.balance().is_positive() {
            InvoiceStatus::Paid
        } else if self.due_date < today {
            InvoiceStatus::Overdue
        } else if self.amount_paid.is_positive() {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Unpaid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    Cheque,
    MobileMoney,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub invoice_id: u64,
    pub amount: Money,
    pub paid_on: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub received_by: Option<u64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePenalty {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub invoice_id: u64,
    pub amount: Money,
    pub reason: String,
    pub applied_on: NaiveDate,
    /// Created by the late-penalty run rather than by a user.
    pub automatic: bool,
}

impl_record!(
    Invoice => "invoice",
    Payment => "payment",
    InvoicePenalty => "penalty",
);
