use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use super::response::ApiError;
use super::ApiState;
use crate::auth::AuthUser;
use crate::validation::ValidationErrors;

/// JSON body extractor answering in the API envelope.
///
/// Unparseable bodies are 400; well-formed JSON of the wrong shape is 422.
/// An empty body reads as `{}`.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };
        serde_json::from_slice(raw).map(ApiJson).map_err(body_error)
    }
}

fn body_error(err: serde_json::Error) -> ApiError {
    match err.classify() {
        Category::Data => {
            let message = err.to_string();
            let message = message
                .rsplit_once(" at line ")
                .map_or(message.as_str(), |(head, _)| head);
            let errors = match missing_field(message) {
                Some(field) => {
                    let mut errors = ValidationErrors::new();
                    errors.required(field, "");
                    errors
                }
                None => ValidationErrors::single("body", format!("The request body is invalid: {message}.")),
            };
            ApiError::Validation(errors)
        }
        Category::Syntax | Category::Eof | Category::Io => {
            ApiError::BadRequest("The request body is not valid JSON.".to_string())
        }
    }
}

/// `missing field `name`` → `name`.
fn missing_field(message: &str) -> Option<&str> {
    message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.strip_suffix('`'))
}

/// Query-string extractor; malformed filters are 422.
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|rejection| {
                ApiError::Validation(ValidationErrors::single("query", rejection.body_text()))
            })
    }
}

/// Numeric `:id` segment; anything else is a 404 like a missing record.
#[derive(Debug, Clone, Copy)]
pub struct RecordId(pub u64);

#[async_trait]
impl<S> FromRequestParts<S> for RecordId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<u64>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| RecordId(id))
            .map_err(|_| ApiError::NotFound("Resource not found.".to_string()))
    }
}

/// The bearer of a valid access token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: AuthUser,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<ApiState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(ApiError::unauthenticated)?;
        let user = state
            .services
            .users
            .authenticate_token(token)?
            .ok_or_else(ApiError::unauthenticated)?;
        Ok(Self {
            user,
            token: token.to_string(),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[derive(Debug, serde::Deserialize)]
    struct Sample {
        #[allow(dead_code)]
        name: String,
        #[allow(dead_code)]
        floors: Option<u32>,
    }

    #[test]
    fn classifies_body_errors() {
        let syntax = serde_json::from_str::<Sample>("{\"name\": ").expect_err("eof");
        assert!(matches!(body_error(syntax), ApiError::BadRequest(_)));

        let missing = serde_json::from_str::<Sample>("{}").expect_err("missing");
        match body_error(missing) {
            ApiError::Validation(errors) => {
                assert_eq!(errors.messages("name"), ["The name field is required."]);
            }
            other => panic!("expected validation, got {other:?}"),
        }

        let wrong_type = serde_json::from_str::<Sample>("{\"name\": \"A\", \"floors\": \"six\"}")
            .expect_err("type");
        match body_error(wrong_type) {
            ApiError::Validation(errors) => assert!(errors.has("body")),
            other => panic!("expected validation, got {other:?}"),
        }
    }

    #[test]
    fn reads_bearer_tokens() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(bearer_token(&headers), None);
    }
}
