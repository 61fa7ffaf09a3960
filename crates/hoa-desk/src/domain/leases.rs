use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::store::{impl_record, RecordMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Active,
    Terminated,
    Expired,
}

impl LeaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeaseStatus::Active => "active",
            LeaseStatus::Terminated => "terminated",
            LeaseStatus::Expired => "expired",
        }
    }
}

/// A tenant's lease on a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub unit_id: u64,
    pub tenant_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Money,
    pub deposit_amount: Money,
    pub status: LeaseStatus,
    pub terminated_on: Option<NaiveDate>,
    pub termination_reason: Option<String>,
    pub document_id: Option<u64>,
    pub notes: Option<String>,
}

impl Lease {
    pub fn is_active(&self) -> bool {
        self.status == LeaseStatus::Active
    }
}

impl_record!(Lease => "lease");
