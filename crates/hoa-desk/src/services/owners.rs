use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::occupancy::settle_unit;
use super::{require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{Role, UnitOwner};
use crate::store::Database;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnerFilter {
    pub unit_id: Option<u64>,
    pub owner_id: Option<u64>,
    /// Only ownerships that have not ended.
    pub current: Option<bool>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitOwnerInput {
    pub unit_id: u64,
    pub owner_id: u64,
    pub ownership_start: NaiveDate,
    pub ownership_end: Option<NaiveDate>,
    /// Defaults to 100.
    pub share_percent: Option<u8>,
    #[serde(default)]
    pub is_resident: bool,
    pub document_id: Option<u64>,
}

#[derive(Clone)]
pub struct UnitOwnerService {
    context: ServiceContext,
}

impl UnitOwnerService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn list(&self, filter: &OwnerFilter) -> Result<Page<UnitOwner>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let today = self.context.today();
        let rows = self.context.store().read(|db| {
            db.unit_owners
                .active()
                .filter(|owner| filter.unit_id.map_or(true, |id| owner.unit_id == id))
                .filter(|owner| filter.owner_id.map_or(true, |id| owner.owner_id == id))
                .filter(|owner| filter.current.map_or(true, |current| owner.is_current(today) == current))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<UnitOwner, ServiceError> {
        self.context
            .store()
            .read(|db| require(&db.unit_owners, id).cloned())?
    }

    pub fn create(&self, input: UnitOwnerInput) -> Result<UnitOwner, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let owner = self.context.store().transaction(|db| {
            let share_percent = validate(db, &input, None, today)?;
            let owner = db.unit_owners.insert(now, |meta| UnitOwner {
                meta,
                unit_id: input.unit_id,
                owner_id: input.owner_id,
                ownership_start: input.ownership_start,
                ownership_end: input.ownership_end,
                share_percent,
                is_resident: input.is_resident,
                document_id: input.document_id,
            });
            settle_unit(db, owner.unit_id, today, now);
            Ok::<_, ServiceError>(owner)
        })?;
        info!(
            unit_owner_id = owner.meta.id,
            unit_id = owner.unit_id,
            owner_id = owner.owner_id,
            "unit owner added"
        );
        Ok(owner)
    }

    pub fn update(&self, id: u64, input: UnitOwnerInput) -> Result<UnitOwner, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let owner = self.context.store().transaction(|db| {
            let previous_unit = require(&db.unit_owners, id)?.unit_id;
            let share_percent = validate(db, &input, Some(id), today)?;
            let owner = db
                .unit_owners
                .update(id, now, |owner| {
                    owner.unit_id = input.unit_id;
                    owner.owner_id = input.owner_id;
                    owner.ownership_start = input.ownership_start;
                    owner.ownership_end = input.ownership_end;
                    owner.share_percent = share_percent;
                    owner.is_resident = input.is_resident;
                    owner.document_id = input.document_id;
                })
                .ok_or_else(|| ServiceError::not_found::<UnitOwner>(id))?;
            settle_unit(db, previous_unit, today, now);
            if previous_unit != owner.unit_id {
                settle_unit(db, owner.unit_id, today, now);
            }
            Ok::<_, ServiceError>(owner)
        })?;
        info!(unit_owner_id = id, "unit owner updated");
        Ok(owner)
    }

    pub fn delete(&self, id: u64) -> Result<UnitOwner, ServiceError> {
        let now = self.context.now();
        let today = self.context.today();
        let owner = self.context.store().transaction(|db| {
            require(&db.unit_owners, id)?;
            let owner = db
                .unit_owners
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<UnitOwner>(id))?;
            settle_unit(db, owner.unit_id, today, now);
            Ok::<_, ServiceError>(owner)
        })?;
        info!(unit_owner_id = id, "unit owner removed");
        Ok(owner)
    }
}

/// Returns the effective share percentage.
fn validate(
    db: &Database,
    input: &UnitOwnerInput,
    current: Option<u64>,
    today: NaiveDate,
) -> Result<u8, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let share_percent = input.share_percent.unwrap_or(100);

    let unit_exists = db.units.contains(input.unit_id);
    if !unit_exists {
        errors.missing_reference("unit_id");
    }
    match db.users.find(input.owner_id) {
        Some(user) if user.role == Role::Owner => {}
        Some(_) => errors.add("owner_id", "The selected owner must have the owner role."),
        None => errors.missing_reference("owner_id"),
    }
    if input
        .ownership_end
        .is_some_and(|end| end < input.ownership_start)
    {
        errors.add(
            "ownership_end",
            "The ownership end must be a date after or equal to ownership start.",
        );
    }
    if !(1..=100).contains(&share_percent) {
        errors.add("share_percent", "The share percent must be between 1 and 100.");
    }
    if input.document_id.is_some_and(|id| !db.documents.contains(id)) {
        errors.missing_reference("document_id");
    }

    if unit_exists {
        let others: Vec<&UnitOwner> = db
            .unit_owners
            .active()
            .filter(|owner| {
                Some(owner.meta.id) != current
                    && owner.unit_id == input.unit_id
                    && owner.is_current(today)
            })
            .collect();
        if others.iter().any(|owner| owner.owner_id == input.owner_id) {
            errors.add("owner_id", "The owner already holds this unit.");
        }
        let held: u32 = others.iter().map(|owner| u32::from(owner.share_percent)).sum();
        if held + u32::from(share_percent) > 100 {
            errors.add(
                "share_percent",
                format!(
                    "The unit's ownership shares may not exceed 100%; {}% is still available.",
                    100u32.saturating_sub(held)
                ),
            );
        }
    }

    errors.into_result()?;
    Ok(share_percent)
}
