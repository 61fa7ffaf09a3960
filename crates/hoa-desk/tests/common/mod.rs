#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Local, TimeZone, Utc};
use hoa_desk::domain::Role;
use hoa_desk::http::{api_router, ApiState};
use hoa_desk::services::{NewUser, ServiceContext, Services};
use hoa_desk::storage::LocalDisk;
use hoa_desk::store::Store;
use mockable::Clock;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const PASSWORD: &str = "correct-horse-9";
pub const BOUNDARY: &str = "hoa-desk-test-boundary";

#[derive(Debug)]
pub struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The `/v1` router over an in-memory store and a temporary public disk.
pub struct TestApp {
    pub router: Router,
    pub services: Services,
    _dir: TempDir,
}

impl TestApp {
    /// An app whose clock reads 2026-03-10 12:00 UTC.
    pub fn new() -> Self {
        Self::with_upload_limit(1024 * 1024)
    }

    pub fn with_upload_limit(max_upload_bytes: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = Utc
            .with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
            .single()
            .expect("valid time");
        let context = ServiceContext::new(
            Store::in_memory(),
            Arc::new(FixedClock(now)),
            Arc::new(LocalDisk::new(dir.path(), "/storage")),
        );
        let services = Services::new(context);
        let router = api_router(ApiState::new(services.clone(), max_upload_bytes));
        Self {
            router,
            services,
            _dir: dir,
        }
    }

    /// Create a user with [`PASSWORD`] and return its id.
    pub fn user(&self, name: &str, email: &str, role: Role) -> u64 {
        self.services
            .users
            .create(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                phone: None,
                role,
                password: PASSWORD.to_string(),
                is_active: Some(true),
            })
            .expect("create user")
            .meta
            .id
    }

    /// Log in over HTTP and return the bearer token.
    pub async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/v1/auth/login",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }

    /// Create a user with `role` and log them in.
    pub async fn session(&self, role: Role) -> (u64, String) {
        let label = format!("{role:?}").to_lowercase();
        let email = format!("{label}@cedar.example");
        let id = self.user(&format!("Test {label}"), &email, role);
        let token = self.login(&email).await;
        (id, token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(token), None).await
    }

    pub async fn upload(&self, uri: &str, token: &str, form: &Multipart) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(form.finish()))
            .expect("request");
        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    /// A building with one unit; returns `(building_id, unit_id)`.
    pub async fn building_with_unit(&self, token: &str, name: &str, unit: &str) -> (u64, u64) {
        let (status, body) = self
            .post(
                "/v1/buildings",
                token,
                json!({ "name": name, "address": "1 Harbour Road", "city": "Mombasa" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let building_id = id_of(&body);

        let (status, body) = self
            .post(
                "/v1/units",
                token,
                json!({ "building_id": building_id, "unit_number": unit }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (building_id, id_of(&body))
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}

pub fn id_of(body: &Value) -> u64 {
    body["data"]["id"].as_u64().expect("id in response data")
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct Multipart {
    body: Vec<u8>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(&self) -> Vec<u8> {
        let mut body = self.body.clone();
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }
}

/// A minimal `.docx` whose body is the given WordprocessingML fragment.
pub fn docx(body: &str) -> Vec<u8> {
    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer
        .start_file("[Content_Types].xml", options)
        .expect("start content types");
    writer
        .write_all(b"<?xml version=\"1.0\"?><Types/>")
        .expect("write content types");
    writer
        .start_file("word/document.xml", options)
        .expect("start document");
    writer
        .write_all(document.as_bytes())
        .expect("write document");
    writer.finish().expect("finish docx").into_inner()
}
