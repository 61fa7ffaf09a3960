use serde::{Deserialize, Serialize};

use crate::store::{impl_record, RecordMeta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub unit_id: u64,
    pub user_id: Option<u64>,
    pub plate_number: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub parking_slot: Option<String>,
}

/// Canonical plate used for uniqueness: uppercase, no spaces or hyphens.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

impl_record!(Vehicle => "vehicle");
