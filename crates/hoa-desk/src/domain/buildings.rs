use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{impl_record, RecordMeta};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub address: String,
    pub city: Option<String>,
    pub total_floors: Option<u16>,
    pub description: Option<String>,
}

/// Occupancy of a unit. Derived from leases and resident owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    Vacant,
    Rented,
    OwnerOccupied,
}

impl UnitStatus {
    pub const fn label(self) -> &'static str {
        match self {
            UnitStatus::Vacant => "vacant",
            UnitStatus::Rented => "rented",
            UnitStatus::OwnerOccupied => "owner_occupied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub building_id: u64,
    pub unit_number: String,
    pub floor: Option<i16>,
    pub area_sqm: Option<f64>,
    pub bedrooms: Option<u8>,
    pub status: UnitStatus,
    pub notes: Option<String>,
}

/// Ownership of a unit by a user with the owner role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOwner {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub unit_id: u64,
    pub owner_id: u64,
    pub ownership_start: NaiveDate,
    pub ownership_end: Option<NaiveDate>,
    pub share_percent: u8,
    pub is_resident: bool,
    pub document_id: Option<u64>,
}

impl UnitOwner {
    /// Ownership that has not ended as of `today`.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.ownership_end.map_or(true, |end| end >= today)
    }
}

impl_record!(
    Building => "building",
    Unit => "unit",
    UnitOwner => "unit owner",
);
