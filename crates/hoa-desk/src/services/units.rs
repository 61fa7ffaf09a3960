use serde::Deserialize;
use tracing::info;

use super::occupancy::active_lease_id;
use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{Unit, UnitStatus};
use crate::store::Database;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitFilter {
    pub building_id: Option<u64>,
    pub status: Option<UnitStatus>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Client-writable unit fields. `status` is derived and never accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitInput {
    pub building_id: u64,
    #[serde(default)]
    pub unit_number: String,
    pub floor: Option<i16>,
    pub area_sqm: Option<f64>,
    pub bedrooms: Option<u8>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct UnitService {
    context: ServiceContext,
}

impl UnitService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn list(&self, filter: &UnitFilter) -> Result<Page<Unit>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.units
                .active()
                .filter(|unit| filter.building_id.map_or(true, |id| unit.building_id == id))
                .filter(|unit| filter.status.map_or(true, |status| unit.status == status))
                .filter(|unit| matches_search(filter.search.as_deref(), &[unit.unit_number.as_str()]))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<Unit, ServiceError> {
        self.context.store().read(|db| require(&db.units, id).cloned())?
    }

    pub fn create(&self, input: UnitInput) -> Result<Unit, ServiceError> {
        let now = self.context.now();
        let unit = self.context.store().transaction(|db| {
            let input = validate(db, input, None)?;
            Ok::<_, ServiceError>(db.units.insert(now, |meta| Unit {
                meta,
                building_id: input.building_id,
                unit_number: input.unit_number,
                floor: input.floor,
                area_sqm: input.area_sqm,
                bedrooms: input.bedrooms,
                status: UnitStatus::Vacant,
                notes: input.notes,
            }))
        })?;
        info!(unit_id = unit.meta.id, building_id = unit.building_id, "unit created");
        Ok(unit)
    }

    pub fn update(&self, id: u64, input: UnitInput) -> Result<Unit, ServiceError> {
        let now = self.context.now();
        let unit = self.context.store().transaction(|db| {
            require(&db.units, id)?;
            let input = validate(db, input, Some(id))?;
            db.units
                .update(id, now, |unit| {
                    unit.building_id = input.building_id;
                    unit.unit_number = input.unit_number;
                    unit.floor = input.floor;
                    unit.area_sqm = input.area_sqm;
                    unit.bedrooms = input.bedrooms;
                    unit.notes = input.notes;
                })
                .ok_or_else(|| ServiceError::not_found::<Unit>(id))
        })?;
        info!(unit_id = id, "unit updated");
        Ok(unit)
    }

    /// Soft delete; refused while a lease on the unit is active.
    pub fn delete(&self, id: u64) -> Result<Unit, ServiceError> {
        let now = self.context.now();
        let unit = self.context.store().transaction(|db| {
            require(&db.units, id)?;
            if active_lease_id(db, id).is_some() {
                return Err(ServiceError::invalid(
                    "unit",
                    "The unit cannot be deleted while it has an active lease.",
                ));
            }
            db.units
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Unit>(id))
        })?;
        info!(unit_id = id, "unit deleted");
        Ok(unit)
    }
}

fn validate(
    db: &Database,
    input: UnitInput,
    current: Option<u64>,
) -> Result<UnitInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let unit_number = input.unit_number.trim().to_string();
    errors.required_max("unit_number", &unit_number, 50);

    if !db.buildings.contains(input.building_id) {
        errors.missing_reference("building_id");
    } else if !unit_number.is_empty()
        && db.units.active().any(|unit| {
            Some(unit.meta.id) != current
                && unit.building_id == input.building_id
                && unit.unit_number.eq_ignore_ascii_case(&unit_number)
        })
    {
        errors.taken("unit_number");
    }

    if input.area_sqm.is_some_and(|area| !area.is_finite() || area <= 0.0) {
        errors.add("area_sqm", "The area sqm must be greater than 0.");
    }
    errors.into_result()?;

    Ok(UnitInput {
        unit_number,
        notes: clean(input.notes),
        ..input
    })
}
