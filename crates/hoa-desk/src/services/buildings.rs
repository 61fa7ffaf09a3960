use serde::Deserialize;
use tracing::info;

use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::Building;
use crate::store::Database;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildingFilter {
    pub search: Option<String>,
    pub city: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildingInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub city: Option<String>,
    pub total_floors: Option<u16>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct BuildingService {
    context: ServiceContext,
}

impl BuildingService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn list(&self, filter: &BuildingFilter) -> Result<Page<Building>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.buildings
                .active()
                .filter(|building| {
                    filter.city.as_deref().map_or(true, |city| {
                        building
                            .city
                            .as_deref()
                            .is_some_and(|own| own.eq_ignore_ascii_case(city.trim()))
                    })
                })
                .filter(|building| {
                    matches_search(
                        filter.search.as_deref(),
                        &[
                            building.name.as_str(),
                            building.address.as_str(),
                            building.city.as_deref().unwrap_or_default(),
                        ],
                    )
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<Building, ServiceError> {
        self.context
            .store()
            .read(|db| require(&db.buildings, id).cloned())?
    }

    pub fn create(&self, input: BuildingInput) -> Result<Building, ServiceError> {
        let now = self.context.now();
        let building = self.context.store().transaction(|db| {
            let input = validate(db, input, None)?;
            Ok::<_, ServiceError>(db.buildings.insert(now, |meta| Building {
                meta,
                name: input.name,
                address: input.address,
                city: input.city,
                total_floors: input.total_floors,
                description: input.description,
            }))
        })?;
        info!(building_id = building.meta.id, "building created");
        Ok(building)
    }

    pub fn update(&self, id: u64, input: BuildingInput) -> Result<Building, ServiceError> {
        let now = self.context.now();
        let building = self.context.store().transaction(|db| {
            require(&db.buildings, id)?;
            let input = validate(db, input, Some(id))?;
            db.buildings
                .update(id, now, |building| {
                    building.name = input.name;
                    building.address = input.address;
                    building.city = input.city;
                    building.total_floors = input.total_floors;
                    building.description = input.description;
                })
                .ok_or_else(|| ServiceError::not_found::<Building>(id))
        })?;
        info!(building_id = id, "building updated");
        Ok(building)
    }

    /// Soft delete; refused while the building still has units.
    pub fn delete(&self, id: u64) -> Result<Building, ServiceError> {
        let now = self.context.now();
        let building = self.context.store().transaction(|db| {
            require(&db.buildings, id)?;
            if db.units.active().any(|unit| unit.building_id == id) {
                return Err(ServiceError::invalid(
                    "building",
                    "The building cannot be deleted while it still has units.",
                ));
            }
            db.buildings
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Building>(id))
        })?;
        info!(building_id = id, "building deleted");
        Ok(building)
    }
}

fn validate(
    db: &Database,
    input: BuildingInput,
    current: Option<u64>,
) -> Result<BuildingInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let name = input.name.trim().to_string();
    errors.required_max("name", &name, 255);
    errors.required_max("address", &input.address, 500);
    errors.optional_max("city", input.city.as_deref(), 120);

    let duplicate = db.buildings.active().any(|building| {
        Some(building.meta.id) != current && building.name.eq_ignore_ascii_case(&name)
    });
    if duplicate && !name.is_empty() {
        errors.taken("name");
    }
    errors.into_result()?;

    Ok(BuildingInput {
        name,
        address: input.address.trim().to_string(),
        city: clean(input.city),
        total_floors: input.total_floors,
        description: clean(input.description),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::Harness;

    fn input(name: &str) -> BuildingInput {
        BuildingInput {
            name: name.to_string(),
            address: "12 Moi Avenue".to_string(),
            city: Some(" Nairobi ".to_string()),
            total_floors: Some(8),
            description: Some(String::new()),
        }
    }

    #[test]
    fn create_then_get_returns_the_same_fields() {
        let harness = Harness::new();
        let service = &harness.services.buildings;
        let created = service.create(input("Acacia Heights")).expect("create");
        assert_eq!(created.city.as_deref(), Some("Nairobi"));
        assert_eq!(created.description, None);
        assert_eq!(service.get(created.meta.id).expect("get"), created);
    }

    #[test]
    fn names_are_unique_ignoring_case() {
        let harness = Harness::new();
        let service = &harness.services.buildings;
        let first = service.create(input("Acacia Heights")).expect("create");
        match service.create(input("acacia heights")) {
            Err(ServiceError::Validation(errors)) => assert!(errors.has("name")),
            other => panic!("expected validation error, got {other:?}"),
        }
        // Updating a building with its own name is fine.
        service.update(first.meta.id, input("Acacia Heights")).expect("update");
    }

    #[test]
    fn delete_is_refused_while_units_exist_and_hides_the_row() {
        let harness = Harness::new();
        let service = &harness.services.buildings;
        let building = service.create(input("Acacia Heights")).expect("create");
        harness.unit(building.meta.id, "A1");
        assert!(matches!(
            service.delete(building.meta.id),
            Err(ServiceError::Validation(_))
        ));

        let empty = service.create(input("Baobab Court")).expect("create");
        service.delete(empty.meta.id).expect("delete");
        assert!(matches!(
            service.get(empty.meta.id),
            Err(ServiceError::NotFound { entity: "building", .. })
        ));
        let listed = service.list(&BuildingFilter::default()).expect("list");
        assert_eq!(listed.total, 1);
    }

    #[test]
    fn list_filters_by_search_and_city() {
        let harness = Harness::new();
        let service = &harness.services.buildings;
        service.create(input("Acacia Heights")).expect("create");
        let mut mombasa = input("Coral Reef");
        mombasa.city = Some("Mombasa".to_string());
        service.create(mombasa).expect("create");

        let filter = BuildingFilter {
            search: Some("coral".to_string()),
            ..BuildingFilter::default()
        };
        assert_eq!(service.list(&filter).expect("list").items[0].name, "Coral Reef");

        let filter = BuildingFilter {
            city: Some("nairobi".to_string()),
            ..BuildingFilter::default()
        };
        let page = service.list(&filter).expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Acacia Heights");
    }
}
