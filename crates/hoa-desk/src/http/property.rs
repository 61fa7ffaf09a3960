use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;

use super::response::{created, deleted, ok, ok_with, page, ApiResult};
use super::{ApiJson, ApiQuery, ApiState, Authenticated, RecordId};
use crate::auth::{Action, Resource};
use crate::services::{
    BuildingFilter, BuildingInput, LeaseChanges, LeaseFilter, NewLease, OwnerFilter,
    TerminateLease, UnitFilter, UnitInput, UnitOwnerInput, VehicleFilter, VehicleInput,
};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/buildings", get(list_buildings).post(create_building))
        .route(
            "/buildings/:id",
            get(show_building).put(update_building).delete(delete_building),
        )
        .route("/units", get(list_units).post(create_unit))
        .route(
            "/units/:id",
            get(show_unit).put(update_unit).delete(delete_unit),
        )
        .route("/unit-owners", get(list_owners).post(create_owner))
        .route(
            "/unit-owners/:id",
            get(show_owner).put(update_owner).delete(delete_owner),
        )
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route(
            "/vehicles/:id",
            get(show_vehicle).put(update_vehicle).delete(delete_vehicle),
        )
        .route("/leases", get(list_leases).post(create_lease))
        .route(
            "/leases/:id",
            get(show_lease).put(update_lease).delete(delete_lease),
        )
        .route("/leases/:id/terminate", post(terminate_lease))
}

async fn list_buildings(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<BuildingFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Buildings, Action::View)?;
    page(state.services.buildings.list(&filter)?)
}

async fn show_building(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Buildings, Action::View)?;
    ok(state.services.buildings.get(id)?)
}

async fn create_building(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<BuildingInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Buildings, Action::Create)?;
    created("Building created successfully.", state.services.buildings.create(input)?)
}

async fn update_building(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(input): ApiJson<BuildingInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Buildings, Action::Update)?;
    ok_with("Building updated successfully.", state.services.buildings.update(id, input)?)
}

async fn delete_building(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Buildings, Action::Delete)?;
    state.services.buildings.delete(id)?;
    deleted("Building deleted successfully.")
}

async fn list_units(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<UnitFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Units, Action::View)?;
    page(state.services.units.list(&filter)?)
}

async fn show_unit(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Units, Action::View)?;
    ok(state.services.units.get(id)?)
}

async fn create_unit(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<UnitInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Units, Action::Create)?;
    created("Unit created successfully.", state.services.units.create(input)?)
}

async fn update_unit(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(input): ApiJson<UnitInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Units, Action::Update)?;
    ok_with("Unit updated successfully.", state.services.units.update(id, input)?)
}

async fn delete_unit(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Units, Action::Delete)?;
    state.services.units.delete(id)?;
    deleted("Unit deleted successfully.")
}

async fn list_owners(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<OwnerFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::UnitOwners, Action::View)?;
    page(state.services.owners.list(&filter)?)
}

async fn show_owner(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::UnitOwners, Action::View)?;
    ok(state.services.owners.get(id)?)
}

async fn create_owner(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<UnitOwnerInput>,
) -> ApiResult {
    auth.user.authorize(Resource::UnitOwners, Action::Create)?;
    created("Unit owner added successfully.", state.services.owners.create(input)?)
}

async fn update_owner(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(input): ApiJson<UnitOwnerInput>,
) -> ApiResult {
    auth.user.authorize(Resource::UnitOwners, Action::Update)?;
    ok_with("Unit owner updated successfully.", state.services.owners.update(id, input)?)
}

async fn delete_owner(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::UnitOwners, Action::Delete)?;
    state.services.owners.delete(id)?;
    deleted("Unit owner removed successfully.")
}

async fn list_vehicles(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<VehicleFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Vehicles, Action::View)?;
    page(state.services.vehicles.list(&filter, auth.user.resident_scope())?)
}

async fn show_vehicle(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Vehicles, Action::View)?;
    let vehicle = state.services.vehicles.get(id)?;
    auth.user.ensure_visible(Resource::Vehicles, &[vehicle.user_id])?;
    ok(vehicle)
}

async fn create_vehicle(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<VehicleInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Vehicles, Action::Create)?;
    created("Vehicle registered successfully.", state.services.vehicles.create(input)?)
}

async fn update_vehicle(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(input): ApiJson<VehicleInput>,
) -> ApiResult {
    auth.user.authorize(Resource::Vehicles, Action::Update)?;
    ok_with("Vehicle updated successfully.", state.services.vehicles.update(id, input)?)
}

async fn delete_vehicle(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Vehicles, Action::Delete)?;
    state.services.vehicles.delete(id)?;
    deleted("Vehicle removed successfully.")
}

async fn list_leases(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<LeaseFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Leases, Action::View)?;
    page(state.services.leases.list(&filter, auth.user.resident_scope())?)
}

async fn show_lease(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Leases, Action::View)?;
    let lease = state.services.leases.get(id)?;
    auth.user.ensure_visible(Resource::Leases, &[Some(lease.tenant_id)])?;
    ok(lease)
}

async fn create_lease(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<NewLease>,
) -> ApiResult {
    auth.user.authorize(Resource::Leases, Action::Create)?;
    created("Lease created successfully.", state.services.leases.create(input)?)
}

async fn update_lease(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(changes): ApiJson<LeaseChanges>,
) -> ApiResult {
    auth.user.authorize(Resource::Leases, Action::Update)?;
    ok_with("Lease updated successfully.", state.services.leases.update(id, changes)?)
}

async fn terminate_lease(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(request): ApiJson<TerminateLease>,
) -> ApiResult {
    auth.user.authorize(Resource::Leases, Action::Update)?;
    ok_with("Lease terminated successfully.", state.services.leases.terminate(id, request)?)
}

async fn delete_lease(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Leases, Action::Delete)?;
    state.services.leases.delete(id)?;
    deleted("Lease deleted successfully.")
}
