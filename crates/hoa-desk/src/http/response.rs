use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::auth::AuthorizationError;
use crate::export::ExportError;
use crate::services::{Page, ServiceError};
use crate::storage::StorageError;
use crate::validation::ValidationErrors;

const GENERIC_FAILURE: &str = "The request could not be completed. Please try again.";

/// Every failure a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    Unauthenticated(String),
    Forbidden(AuthorizationError),
    Validation(ValidationErrors),
    NotFound(String),
    BadRequest(String),
}

pub type ApiResult = Result<Response, ApiError>;

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self::Unauthenticated("Unauthenticated.".to_string())
    }

    /// Log the cause and answer with the generic message.
    fn internal(context: &str, cause: &dyn std::fmt::Display) -> Self {
        error!(error = %cause, "{context}");
        Self::BadRequest(GENERIC_FAILURE.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errors) => json!({
                "status": "error",
                "message": errors.to_string(),
                "errors": errors,
            }),
            ApiError::Forbidden(err) => json!({ "status": "error", "message": err.to_string() }),
            ApiError::Unauthenticated(message)
            | ApiError::NotFound(message)
            | ApiError::BadRequest(message) => json!({ "status": "error", "message": message }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(value: AuthorizationError) -> Self {
        Self::Forbidden(value)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Validation(errors) => Self::Validation(errors),
            ServiceError::NotFound { entity, .. } => Self::NotFound(not_found_message(entity)),
            ServiceError::InvalidCredentials => {
                Self::Unauthenticated(ServiceError::InvalidCredentials.to_string())
            }
            ServiceError::Storage(StorageError::NotFound(_)) => {
                Self::NotFound("The requested file could not be found.".to_string())
            }
            ServiceError::Store(err) => Self::internal("persistence failure", &err),
            ServiceError::Storage(err) => Self::internal("file storage failure", &err),
            ServiceError::Template(err) => Self::internal("template rendering failure", &err),
            ServiceError::Password(err) => Self::internal("password hashing failure", &err),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::internal("blocking task failed", &value)
    }
}

impl From<ExportError> for ApiError {
    fn from(value: ExportError) -> Self {
        Self::internal("export failure", &value)
    }
}

/// `document template` → `Document template not found.`
fn not_found_message(entity: &str) -> String {
    let mut chars = entity.chars();
    match chars.next() {
        Some(first) => format!("{}{} not found.", first.to_uppercase(), chars.as_str()),
        None => "Resource not found.".to_string(),
    }
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageMeta {
    pub current_page: usize,
    pub per_page: usize,
    pub total: usize,
    pub last_page: usize,
}

fn envelope<T: Serialize>(
    status: StatusCode,
    message: Option<&str>,
    data: T,
    meta: Option<PageMeta>,
) -> ApiResult {
    let body = Envelope {
        status: "success",
        message: message.map(str::to_string),
        data,
        meta,
    };
    Ok((status, Json(body)).into_response())
}

pub fn ok<T: Serialize>(data: T) -> ApiResult {
    envelope(StatusCode::OK, None, data, None)
}

pub fn ok_with<T: Serialize>(message: &str, data: T) -> ApiResult {
    envelope(StatusCode::OK, Some(message), data, None)
}

pub fn created<T: Serialize>(message: &str, data: T) -> ApiResult {
    envelope(StatusCode::CREATED, Some(message), data, None)
}

pub fn deleted(message: &str) -> ApiResult {
    envelope(StatusCode::OK, Some(message), serde_json::Value::Null, None)
}

pub fn page<T: Serialize>(page: Page<T>) -> ApiResult {
    let meta = PageMeta {
        current_page: page.current_page,
        per_page: page.per_page,
        total: page.total,
        last_page: page.last_page,
    };
    envelope(StatusCode::OK, None, page.items, Some(meta))
}
