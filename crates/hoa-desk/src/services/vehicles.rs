use serde::Deserialize;
use tracing::info;

use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{normalize_plate, Vehicle};
use crate::store::Database;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleFilter {
    pub unit_id: Option<u64>,
    pub user_id: Option<u64>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleInput {
    pub unit_id: u64,
    pub user_id: Option<u64>,
    #[serde(default)]
    pub plate_number: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub parking_slot: Option<String>,
}

#[derive(Clone)]
pub struct VehicleService {
    context: ServiceContext,
}

impl VehicleService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// `scope` restricts the listing to vehicles registered to one user.
    pub fn list(
        &self,
        filter: &VehicleFilter,
        scope: Option<u64>,
    ) -> Result<Page<Vehicle>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.vehicles
                .active()
                .filter(|vehicle| scope.map_or(true, |user| vehicle.user_id == Some(user)))
                .filter(|vehicle| filter.unit_id.map_or(true, |id| vehicle.unit_id == id))
                .filter(|vehicle| filter.user_id.map_or(true, |id| vehicle.user_id == Some(id)))
                .filter(|vehicle| {
                    matches_search(
                        filter.search.as_deref(),
                        &[
                            vehicle.plate_number.as_str(),
                            vehicle.make.as_deref().unwrap_or_default(),
                            vehicle.model.as_deref().unwrap_or_default(),
                        ],
                    )
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<Vehicle, ServiceError> {
        self.context
            .store()
            .read(|db| require(&db.vehicles, id).cloned())?
    }

    pub fn create(&self, input: VehicleInput) -> Result<Vehicle, ServiceError> {
        let now = self.context.now();
        let vehicle = self.context.store().transaction(|db| {
            let input = validate(db, input, None)?;
            Ok::<_, ServiceError>(db.vehicles.insert(now, |meta| Vehicle {
                meta,
                unit_id: input.unit_id,
                user_id: input.user_id,
                plate_number: input.plate_number,
                make: input.make,
                model: input.model,
                color: input.color,
                parking_slot: input.parking_slot,
            }))
        })?;
        info!(vehicle_id = vehicle.meta.id, plate = %vehicle.plate_number, "vehicle registered");
        Ok(vehicle)
    }

    pub fn update(&self, id: u64, input: VehicleInput) -> Result<Vehicle, ServiceError> {
        let now = self.context.now();
        let vehicle = self.context.store().transaction(|db| {
            require(&db.vehicles, id)?;
            let input = validate(db, input, Some(id))?;
            db.vehicles
                .update(id, now, |vehicle| {
                    vehicle.unit_id = input.unit_id;
                    vehicle.user_id = input.user_id;
                    vehicle.plate_number = input.plate_number;
                    vehicle.make = input.make;
                    vehicle.model = input.model;
                    vehicle.color = input.color;
                    vehicle.parking_slot = input.parking_slot;
                })
                .ok_or_else(|| ServiceError::not_found::<Vehicle>(id))
        })?;
        info!(vehicle_id = id, "vehicle updated");
        Ok(vehicle)
    }

    pub fn delete(&self, id: u64) -> Result<Vehicle, ServiceError> {
        let now = self.context.now();
        let vehicle = self.context.store().transaction(|db| {
            require(&db.vehicles, id)?;
            db.vehicles
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Vehicle>(id))
        })?;
        info!(vehicle_id = id, "vehicle removed");
        Ok(vehicle)
    }
}

/// Plates are stored normalized so uniqueness ignores case, spaces and hyphens.
fn validate(
    db: &Database,
    input: VehicleInput,
    current: Option<u64>,
) -> Result<VehicleInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let plate_number = normalize_plate(&input.plate_number);
    errors.required_max("plate_number", &plate_number, 20);

    if !db.units.contains(input.unit_id) {
        errors.missing_reference("unit_id");
    }
    if input.user_id.is_some_and(|id| !db.users.contains(id)) {
        errors.missing_reference("user_id");
    }
    if !plate_number.is_empty()
        && db.vehicles.active().any(|vehicle| {
            Some(vehicle.meta.id) != current && vehicle.plate_number == plate_number
        })
    {
        errors.taken("plate_number");
    }
    errors.into_result()?;

    Ok(VehicleInput {
        unit_id: input.unit_id,
        user_id: input.user_id,
        plate_number,
        make: clean(input.make),
        model: clean(input.model),
        color: clean(input.color),
        parking_slot: clean(input.parking_slot),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::services::testing::Harness;

    fn input(unit_id: u64, user_id: Option<u64>, plate: &str) -> VehicleInput {
        VehicleInput {
            unit_id,
            user_id,
            plate_number: plate.to_string(),
            make: Some("Toyota".to_string()),
            model: Some("Probox".to_string()),
            color: None,
            parking_slot: Some("P-12".to_string()),
        }
    }

    #[test]
    fn plates_are_normalized_and_unique() {
        let harness = Harness::new();
        let building = harness.building("Cedar Court");
        let unit_id = harness.unit(building.meta.id, "A1").meta.id;
        let vehicles = &harness.services.vehicles;

        let car = vehicles.create(input(unit_id, None, "kda 123a")).expect("create");
        assert_eq!(car.plate_number, "KDA123A");

        match vehicles.create(input(unit_id, None, "KDA-123A")) {
            Err(ServiceError::Validation(errors)) => assert!(errors.has("plate_number")),
            other => panic!("expected validation error, got {other:?}"),
        }

        // Once removed the plate can be registered again.
        vehicles.delete(car.meta.id).expect("delete");
        vehicles
            .create(input(unit_id, None, "KDA 123A"))
            .expect("re-register");
    }

    #[test]
    fn residents_see_only_their_vehicles() {
        let harness = Harness::new();
        let building = harness.building("Cedar Court");
        let unit_id = harness.unit(building.meta.id, "A1").meta.id;
        let tenant = harness.user("Wanjiru Tenant", Role::Tenant).meta.id;
        let vehicles = &harness.services.vehicles;
        vehicles
            .create(input(unit_id, Some(tenant), "KDA 001A"))
            .expect("create");
        vehicles.create(input(unit_id, None, "KDB 002B")).expect("create");

        let filter = VehicleFilter::default();
        assert_eq!(vehicles.list(&filter, None).expect("list").total, 2);
        let mine = vehicles.list(&filter, Some(tenant)).expect("list");
        assert_eq!(mine.total, 1);
        assert_eq!(mine.items[0].plate_number, "KDA001A");
    }
}
