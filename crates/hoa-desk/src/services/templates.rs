use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use super::documents::{category_or_default, put_unique};
use super::{clean, matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{Document, DocumentLinks, DocumentTemplate, LeaseStatus};
use crate::storage::{sanitize_file_name, slugify};
use crate::store::Database;
use crate::templating::{
    pdf_renderable, render_text_pdf, DocxTemplate, OutputFormat, TemplateError, DOCX_MIME,
};
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateUpload {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub original_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateChanges {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub description: Option<String>,
}

/// Request to fill a template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateDocument {
    /// Explicit placeholder values; these win over values derived from links.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    pub unit_id: Option<u64>,
    pub lease_id: Option<u64>,
    pub invoice_id: Option<u64>,
    pub user_id: Option<u64>,
    #[serde(default)]
    pub format: OutputFormat,
    /// Defaults to the template name.
    pub title: Option<String>,
}

#[derive(Clone)]
pub struct TemplateService {
    context: ServiceContext,
}

impl TemplateService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    pub fn list(&self, filter: &TemplateFilter) -> Result<Page<DocumentTemplate>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.templates
                .active()
                .filter(|template| {
                    filter
                        .category
                        .as_deref()
                        .map_or(true, |category| template.category == category)
                })
                .filter(|template| {
                    matches_search(
                        filter.search.as_deref(),
                        &[
                            template.name.as_str(),
                            template.description.as_deref().unwrap_or_default(),
                        ],
                    )
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<DocumentTemplate, ServiceError> {
        self.context
            .store()
            .read(|db| require(&db.templates, id).cloned())?
    }

    /// Parse the `.docx`, record its placeholders and keep the file.
    pub fn upload(&self, upload: TemplateUpload) -> Result<DocumentTemplate, ServiceError> {
        let mut errors = ValidationErrors::new();
        let name = upload.name.trim().to_string();
        let category = category_or_default(&upload.category);
        errors.required_max("name", &name, 255);
        errors.slug("category", &category);
        let placeholders = if upload.bytes.is_empty() {
            errors.add("file", "The file field is required.");
            Vec::new()
        } else {
            match DocxTemplate::from_bytes(&upload.bytes).and_then(|docx| docx.placeholders()) {
                Ok(placeholders) => placeholders,
                Err(err) => {
                    warn!(error = %err, "rejected template upload");
                    errors.add("file", "The file must be a valid .docx document.");
                    Vec::new()
                }
            }
        };
        errors.into_result()?;

        let now = self.context.now();
        let storage = self.context.storage();
        let path = put_unique(
            storage.as_ref(),
            now,
            &format!("template_documents/{category}"),
            &sanitize_file_name(&upload.original_name),
            &upload.bytes,
        )?;

        let result = self.context.store().transaction(|db| {
            let mut errors = ValidationErrors::new();
            if name_taken(db, &name, None) {
                errors.taken("name");
            }
            errors.into_result()?;
            Ok::<_, ServiceError>(db.templates.insert(now, |meta| DocumentTemplate {
                meta,
                name,
                category,
                description: clean(upload.description),
                path: path.clone(),
                original_name: upload.original_name.trim().to_string(),
                placeholders,
            }))
        });

        match result {
            Ok(template) => {
                info!(
                    template_id = template.meta.id,
                    placeholders = template.placeholders.len(),
                    "document template uploaded"
                );
                Ok(template)
            }
            Err(err) => {
                if let Err(cleanup) = storage.delete(&path) {
                    warn!(%path, error = %cleanup, "failed to remove orphaned template");
                }
                Err(err)
            }
        }
    }

    pub fn update(&self, id: u64, changes: TemplateChanges) -> Result<DocumentTemplate, ServiceError> {
        let now = self.context.now();
        let template = self.context.store().transaction(|db| {
            require(&db.templates, id)?;
            let mut errors = ValidationErrors::new();
            let name = changes.name.trim().to_string();
            let category = category_or_default(&changes.category);
            errors.required_max("name", &name, 255);
            errors.slug("category", &category);
            if name_taken(db, &name, Some(id)) {
                errors.taken("name");
            }
            errors.into_result()?;
            db.templates
                .update(id, now, |template| {
                    template.name = name;
                    template.category = category;
                    template.description = clean(changes.description);
                })
                .ok_or_else(|| ServiceError::not_found::<DocumentTemplate>(id))
        })?;
        info!(template_id = id, "document template updated");
        Ok(template)
    }

    pub fn delete(&self, id: u64) -> Result<DocumentTemplate, ServiceError> {
        let now = self.context.now();
        let template = self.context.store().transaction(|db| {
            require(&db.templates, id)?;
            db.templates
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<DocumentTemplate>(id))
        })?;
        info!(template_id = id, "document template deleted");
        Ok(template)
    }

    /// Fill the template and register the output as a document.
    ///
    /// Values derived from the linked unit, lease, invoice and user are
    /// merged first; explicit `values` override them. Every placeholder
    /// left without a value is reported as `values.{name}`.
    pub fn generate(
        &self,
        id: u64,
        request: GenerateDocument,
        generated_by: Option<u64>,
    ) -> Result<Document, ServiceError> {
        let today = self.context.today();
        let (template, links, mut values) = self.context.store().read(|db| {
            let template = require(&db.templates, id)?.clone();
            let links = resolve_links(db, &request)?;
            let values = derived_values(db, &links, today);
            Ok::<_, ServiceError>((template, links, values))
        })??;
        values.extend(
            request
                .values
                .iter()
                .map(|(key, value)| (key.trim().to_string(), value.clone())),
        );

        let storage = self.context.storage();
        let source = storage.get(&template.path)?;
        let rendered = match DocxTemplate::from_bytes(&source)?.render(&values) {
            Ok(rendered) => rendered,
            Err(TemplateError::MissingValues(missing)) => {
                let mut errors = ValidationErrors::new();
                for name in missing {
                    errors.add(
                        format!("values.{name}"),
                        format!("A value for the {name} placeholder is required."),
                    );
                }
                return Err(errors.into());
            }
            Err(err) => return Err(err.into()),
        };

        let title = clean(request.title).unwrap_or_else(|| template.name.clone());
        let (bytes, mime_type) = match request.format {
            OutputFormat::Pdf => {
                check_pdf_text(&template, &values, &title)?;
                let pdf = render_text_pdf(&title, &rendered.paragraphs).map_err(|err| match err {
                    TemplateError::Unrenderable(_) => ServiceError::invalid(
                        "format",
                        "The template contains characters that cannot be rendered in a PDF; generate it as docx instead.",
                    ),
                    other => other.into(),
                })?;
                (pdf, "application/pdf")
            }
            OutputFormat::Docx => (rendered.bytes, DOCX_MIME),
        };
        let extension = request.format.extension();
        let file_name = format!("{}.{extension}", slugify(&title));
        let now = self.context.now();
        let path = put_unique(
            storage.as_ref(),
            now,
            &format!("generated_documents/{}", template.category),
            &file_name,
            &bytes,
        )?;

        let size_bytes = bytes.len() as u64;
        let result = self.context.store().transaction(|db| {
            require(&db.templates, id)?;
            Ok::<_, ServiceError>(db.documents.insert(now, |meta| Document {
                meta,
                title,
                category: template.category.clone(),
                path: path.clone(),
                original_name: file_name,
                mime_type: mime_type.to_string(),
                size_bytes,
                uploaded_by: generated_by,
                links,
                template_id: Some(id),
            }))
        });

        match result {
            Ok(document) => {
                info!(
                    template_id = id,
                    document_id = document.meta.id,
                    format = extension,
                    "document generated"
                );
                Ok(document)
            }
            Err(err) => {
                if let Err(cleanup) = storage.delete(&path) {
                    warn!(%path, error = %cleanup, "failed to remove orphaned document");
                }
                Err(err)
            }
        }
    }
}

fn name_taken(db: &Database, name: &str, current: Option<u64>) -> bool {
    !name.is_empty()
        && db
            .templates
            .active()
            .any(|template| Some(template.meta.id) != current && template.name.eq_ignore_ascii_case(name))
}

/// Validate the requested links and fill in the ones they imply.
fn resolve_links(db: &Database, request: &GenerateDocument) -> Result<DocumentLinks, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let lease = request.lease_id.and_then(|id| db.leases.find(id));
    let invoice = request.invoice_id.and_then(|id| db.invoices.find(id));
    if request.lease_id.is_some() && lease.is_none() {
        errors.missing_reference("lease_id");
    }
    if request.invoice_id.is_some() && invoice.is_none() {
        errors.missing_reference("invoice_id");
    }
    if request.unit_id.is_some_and(|id| !db.units.contains(id)) {
        errors.missing_reference("unit_id");
    }
    if request.user_id.is_some_and(|id| !db.users.contains(id)) {
        errors.missing_reference("user_id");
    }
    errors.into_result()?;

    let unit_id = request
        .unit_id
        .or_else(|| lease.map(|lease| lease.unit_id))
        .or_else(|| invoice.map(|invoice| invoice.unit_id));
    Ok(DocumentLinks {
        building_id: unit_id
            .and_then(|id| db.units.find(id))
            .map(|unit| unit.building_id),
        unit_id,
        lease_id: request.lease_id,
        invoice_id: request.invoice_id,
        payment_id: None,
        user_id: request.user_id,
    })
}

fn derived_values(db: &Database, links: &DocumentLinks, today: NaiveDate) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    let mut put = |key: &str, value: String| {
        values.insert(key.to_string(), value);
    };
    put("today", format_date(today));

    if let Some(unit) = links.unit_id.and_then(|id| db.units.find(id)) {
        put("unit_number", unit.unit_number.clone());
        if let Some(building) = db.buildings.find_with_trashed(unit.building_id) {
            put("building_name", building.name.clone());
            put("building_address", building.address.clone());
        }
    }

    let lease = links.lease_id.and_then(|id| db.leases.find(id)).or_else(|| {
        links.unit_id.and_then(|unit_id| {
            db.leases
                .active()
                .find(|lease| lease.unit_id == unit_id && lease.status == LeaseStatus::Active)
        })
    });
    if let Some(lease) = lease {
        put("lease_start", format_date(lease.start_date));
        put("lease_end", format_date(lease.end_date));
        put("monthly_rent", lease.monthly_rent.to_string());
        if let Some(tenant) = db.users.find_with_trashed(lease.tenant_id) {
            put("tenant_name", tenant.name.clone());
            put("tenant_email", tenant.email.clone());
        }
    }

    if let Some(invoice) = links.invoice_id.and_then(|id| db.invoices.find(id)) {
        put("invoice_number", invoice.invoice_number.clone());
        put("invoice_amount", invoice.total_due().to_string());
        put("invoice_due_date", format_date(invoice.due_date));
    }

    if let Some(user) = links.user_id.and_then(|id| db.users.find(id)) {
        put("user_name", user.name.clone());
        put("user_email", user.email.clone());
    }
    values
}

/// Placeholder values and the title must fit the PDF font encoding.
fn check_pdf_text(
    template: &DocumentTemplate,
    values: &BTreeMap<String, String>,
    title: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    for name in &template.placeholders {
        if values.get(name).is_some_and(|value| !pdf_renderable(value)) {
            errors.add(
                format!("values.{name}"),
                format!("The {name} value contains characters that cannot be rendered in a PDF."),
            );
        }
    }
    if !pdf_renderable(title) {
        errors.add("title", "The title contains characters that cannot be rendered in a PDF.");
    }
    errors.into_result()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
