use std::collections::BTreeMap;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use super::response::{created, deleted, ok, ok_with, page, ApiError, ApiResult};
use super::views::DocumentView;
use super::{blocking, ApiJson, ApiQuery, ApiState, Authenticated, RecordId};
use crate::auth::{Action, Resource};
use crate::domain::{Document, DocumentLinks};
use crate::services::{
    DocumentChanges, DocumentFilter, DocumentUpload, GenerateDocument, Services, TemplateChanges,
    TemplateFilter, TemplateUpload,
};
use crate::validation::{label, ValidationErrors};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/documents", get(list_documents).post(upload_document))
        .route(
            "/documents/:id",
            get(show_document).put(update_document).delete(delete_document),
        )
        .route("/documents/:id/download", get(download_document))
        .route("/document-templates", get(list_templates).post(upload_template))
        .route(
            "/document-templates/:id",
            get(show_template).put(update_template).delete(delete_template),
        )
        .route("/document-templates/:id/generate", post(generate_document))
}

fn view(services: &Services, document: Document) -> DocumentView {
    let url = services.documents.url(&document);
    DocumentView { document, url }
}

#[derive(Debug, Default)]
struct UploadForm {
    fields: BTreeMap<String, String>,
    file: Option<UploadedFile>,
}

#[derive(Debug)]
struct UploadedFile {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl UploadForm {
    fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn id(&self, key: &str, errors: &mut ValidationErrors) -> Option<u64> {
        let raw = self.text(key)?;
        match raw.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add(key, format!("The {} must be an integer.", label(key)));
                None
            }
        }
    }

    fn links(&self, errors: &mut ValidationErrors) -> DocumentLinks {
        DocumentLinks {
            building_id: self.id("building_id", errors),
            unit_id: self.id("unit_id", errors),
            lease_id: self.id("lease_id", errors),
            invoice_id: self.id("invoice_id", errors),
            payment_id: self.id("payment_id", errors),
            user_id: self.id("user_id", errors),
        }
    }
}

async fn read_form(
    multipart: Result<Multipart, MultipartRejection>,
    max_bytes: usize,
) -> Result<UploadForm, ApiError> {
    let mut multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, max_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| multipart_error(err, max_bytes))?;
            if bytes.len() > max_bytes {
                return Err(too_large(max_bytes));
            }
            form.file = Some(UploadedFile {
                name: file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|err| multipart_error(err, max_bytes))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

fn too_large(max_bytes: usize) -> ApiError {
    ApiError::Validation(ValidationErrors::single(
        "file",
        format!("The file may not be greater than {} kilobytes.", max_bytes / 1024),
    ))
}

fn file_required() -> ApiError {
    ApiError::Validation(ValidationErrors::single("file", "The file field is required."))
}

async fn list_documents(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<DocumentFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Documents, Action::View)?;
    let documents = state
        .services
        .documents
        .list(&filter, auth.user.resident_scope())?;
    page(documents.map(|document| view(&state.services, document)))
}

async fn show_document(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Documents, Action::View)?;
    let document = state.services.documents.get(id)?;
    auth.user.ensure_visible(
        Resource::Documents,
        &[document.uploaded_by, document.links.user_id],
    )?;
    ok(view(&state.services, document))
}

async fn upload_document(
    State(state): State<ApiState>,
    auth: Authenticated,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    auth.user.authorize(Resource::Documents, Action::Create)?;
    let form = read_form(multipart, state.max_upload_bytes).await?;

    let mut errors = ValidationErrors::new();
    let links = form.links(&mut errors);
    errors.into_result()?;
    let title = form.text("title");
    let category = form.text("category").unwrap_or_default();
    let file = form.file.ok_or_else(file_required)?;

    let upload = DocumentUpload {
        title: title.unwrap_or_else(|| file.name.clone()),
        category,
        links,
        original_name: file.name,
        bytes: file.bytes,
        content_type: file.content_type,
    };
    let documents = state.services.documents.clone();
    let uploaded_by = auth.user.id;
    let document = blocking(move || documents.upload(upload, Some(uploaded_by))).await?;
    created("Document uploaded successfully.", view(&state.services, document))
}

async fn update_document(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(changes): ApiJson<DocumentChanges>,
) -> ApiResult {
    auth.user.authorize(Resource::Documents, Action::Update)?;
    let document = state.services.documents.update(id, changes)?;
    ok_with("Document updated successfully.", view(&state.services, document))
}

async fn delete_document(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Documents, Action::Delete)?;
    state.services.documents.delete(id)?;
    deleted("Document deleted successfully.")
}

async fn download_document(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Documents, Action::View)?;
    let document = state.services.documents.get(id)?;
    auth.user.ensure_visible(
        Resource::Documents,
        &[document.uploaded_by, document.links.user_id],
    )?;
    let documents = state.services.documents.clone();
    let (document, bytes) = blocking(move || documents.download(document.meta.id)).await?;
    let file_name = document.original_name.replace(['"', '\\', '\r', '\n'], "_");
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, document.mime_type),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
        ],
        bytes,
    )
        .into_response())
}

async fn list_templates(
    State(state): State<ApiState>,
    auth: Authenticated,
    ApiQuery(filter): ApiQuery<TemplateFilter>,
) -> ApiResult {
    auth.user.authorize(Resource::Templates, Action::View)?;
    page(state.services.templates.list(&filter)?)
}

async fn show_template(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Templates, Action::View)?;
    ok(state.services.templates.get(id)?)
}

async fn upload_template(
    State(state): State<ApiState>,
    auth: Authenticated,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    auth.user.authorize(Resource::Templates, Action::Create)?;
    let form = read_form(multipart, state.max_upload_bytes).await?;
    let name = form.text("name").unwrap_or_default();
    let category = form.text("category").unwrap_or_default();
    let description = form.text("description");
    let file = form.file.ok_or_else(file_required)?;

    let upload = TemplateUpload {
        name,
        category,
        description,
        original_name: file.name,
        bytes: file.bytes,
    };
    let templates = state.services.templates.clone();
    let template = blocking(move || templates.upload(upload)).await?;
    created("Document template uploaded successfully.", template)
}

async fn update_template(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(changes): ApiJson<TemplateChanges>,
) -> ApiResult {
    auth.user.authorize(Resource::Templates, Action::Update)?;
    ok_with(
        "Document template updated successfully.",
        state.services.templates.update(id, changes)?,
    )
}

async fn delete_template(State(state): State<ApiState>, auth: Authenticated, RecordId(id): RecordId) -> ApiResult {
    auth.user.authorize(Resource::Templates, Action::Delete)?;
    state.services.templates.delete(id)?;
    deleted("Document template deleted successfully.")
}

async fn generate_document(
    State(state): State<ApiState>,
    auth: Authenticated,
    RecordId(id): RecordId,
    ApiJson(request): ApiJson<GenerateDocument>,
) -> ApiResult {
    auth.user.authorize(Resource::Templates, Action::View)?;
    auth.user.authorize(Resource::Documents, Action::Create)?;
    let templates = state.services.templates.clone();
    let generated_by = auth.user.id;
    let document = blocking(move || templates.generate(id, request, Some(generated_by))).await?;
    created("Document generated successfully.", view(&state.services, document))
}
