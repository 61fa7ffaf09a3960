use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::store::{impl_record, RecordMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeFrequency {
    OneTime,
    Monthly,
    Quarterly,
    Yearly,
}

impl FeeFrequency {
    /// Key naming the billing cycle that contains `date`.
    pub fn period_key(self, date: NaiveDate) -> String {
        match self {
            FeeFrequency::OneTime => "one-time".to_string(),
            FeeFrequency::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
            FeeFrequency::Quarterly => {
                format!("{:04}-Q{}", date.year(), (date.month() - 1) / 3 + 1)
            }
            FeeFrequency::Yearly => format!("{:04}", date.year()),
        }
    }
}

/// Which units of the fee's building(s) are billed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeScope {
    AllUnits,
    #[default]
    OccupiedUnits,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    #[default]
    Active,
    Inactive,
}

/// Association charge such as a service charge or sinking-fund levy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub description: Option<String>,
    pub building_id: Option<u64>,
    pub amount: Money,
    pub frequency: FeeFrequency,
    pub applies_to: FeeScope,
    pub status: FeeStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub due_in_days: u32,
    pub last_billed_period: Option<String>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl Fee {
    /// Active and inside its start/end window on `today`.
    pub fn is_billable_on(&self, today: NaiveDate) -> bool {
        self.status == FeeStatus::Active
            && self.start_date <= today
            && self.end_date.map_or(true, |end| end >= today)
    }
}

impl_record!(Fee => "fee");

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn period_keys_follow_frequency() {
        let day = date(2026, 8, 17);
        assert_eq!(FeeFrequency::Monthly.period_key(day), "2026-08");
        assert_eq!(FeeFrequency::Quarterly.period_key(day), "2026-Q3");
        assert_eq!(FeeFrequency::Yearly.period_key(day), "2026");
        assert_eq!(FeeFrequency::OneTime.period_key(day), "one-time");
        assert_eq!(FeeFrequency::Quarterly.period_key(date(2026, 1, 1)), "2026-Q1");
        assert_eq!(FeeFrequency::Quarterly.period_key(date(2026, 12, 31)), "2026-Q4");
    }
}
