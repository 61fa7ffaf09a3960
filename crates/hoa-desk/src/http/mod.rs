//! The `/v1` JSON API.
//!
//! Handlers authenticate the bearer token, check the role policy, call one
//! service and wrap the result in the `{status, message, data}` envelope.

mod billing;
mod documents;
mod extract;
mod property;
mod response;
mod users;
mod views;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::services::{ServiceError, Services};

pub use extract::{ApiJson, ApiQuery, Authenticated, RecordId};
pub use response::{ApiError, ApiResult, PageMeta};
pub use views::{DocumentView, SessionView, UserView};

/// Room for multipart boundaries and text fields around an upload.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// State shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    pub services: Services,
    pub max_upload_bytes: usize,
}

impl ApiState {
    pub fn new(services: Services, max_upload_bytes: usize) -> Self {
        Self {
            services,
            max_upload_bytes,
        }
    }
}

/// Run service work that hashes passwords or touches the disk on the
/// blocking pool.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}

/// Every `/v1` route, with the body limit applied.
pub fn api_router(state: ApiState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    let v1 = Router::new()
        .merge(users::routes())
        .merge(property::routes())
        .merge(billing::routes())
        .merge(documents::routes());

    Router::new()
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
