use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;

use super::response::{created, deleted, ok, ok_with, page, ApiResult};
use super::views::{SessionView, UserView};
use super::{blocking, ApiJson, ApiQuery, ApiState, Authenticated, RecordId};
use crate::auth::{Action, Resource};
use crate::services::{LoginRequest, NewUser, UserChanges, UserFilter};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(show_user).put(update_user).delete(delete_user),
        )
}

async fn login(State(state): State<ApiState>, ApiJson(request): ApiJson<LoginRequest>) -> ApiResult {
    let users = state.services.users.clone();
    let session = blocking(move || users.login(&request)).await?;
    ok_with("Login successful.", SessionView::from(session))
}

async fn logout(State(state): State<ApiState>, auth: Authenticated) -> ApiResult {
    state.services.users.logout(&auth.token)?;
    deleted("Logged out successfully.")
}

async fn me(State(state): State<ApiState>, auth: Authenticated) -> ApiResult {
    let user = state.services.users.get(auth.user.id)?;
    ok(UserView::from(user))
}

async fn list_users(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Users, Action::View)?;
    page(state.services.users.list(&filter)?.map(UserView::from))
}

async fn show_user(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Users, Action::View)?;
    ok(UserView::from(state.services.users.get(id)?))
}

async fn create_user(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiJson(input): ApiJson<NewUser>,
) -> ApiResult {
    auth.user.authorize(Resource::Users, Action::Create)?;
    let users = state.services.users.clone();
    let user = blocking(move || users.create(input)).await?;
    created("User created successfully.", UserView::from(user))
}

async fn update_user(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(changes): ApiJson<UserChanges>,
) -> ApiResult {
    auth.user.authorize(Resource::Users, Action::Update)?;
    let users = state.services.users.clone();
    let user = blocking(move || users.update(id, changes)).await?;
    ok_with("User updated successfully.", UserView::from(user))
}

async fn delete_user(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Users, Action::Delete)?;
    state.services.users.delete(id, auth.user.id)?;
    deleted("User deleted successfully.")
}
