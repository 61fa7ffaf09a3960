use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::{matches_search, require, Page, PageRequest, ServiceContext, ServiceError};
use crate::domain::{Document, DocumentLinks};
use crate::storage::{sanitize_file_name, FileStorage, StorageError};
use crate::store::Database;
use crate::validation::ValidationErrors;

pub(crate) const DEFAULT_CATEGORY: &str = "general";
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    pub category: Option<String>,
    pub building_id: Option<u64>,
    pub unit_id: Option<u64>,
    pub lease_id: Option<u64>,
    pub invoice_id: Option<u64>,
    pub user_id: Option<u64>,
    pub template_id: Option<u64>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// A file received from a client plus its metadata.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpload {
    pub title: String,
    /// Blank means `general`.
    pub category: String,
    pub links: DocumentLinks,
    pub original_name: String,
    pub bytes: Vec<u8>,
    /// Client-declared type, used when the extension is unknown.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentChanges {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, flatten)]
    pub links: DocumentLinks,
}

#[derive(Clone)]
pub struct DocumentService {
    context: ServiceContext,
}

impl DocumentService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// `scope` limits the listing to documents a resident uploaded or is linked to.
    pub fn list(
        &self,
        filter: &DocumentFilter,
        scope: Option<u64>,
    ) -> Result<Page<Document>, ServiceError> {
        let request = PageRequest::new(filter.page, filter.per_page);
        let rows = self.context.store().read(|db| {
            db.documents
                .active()
                .filter(|doc| {
                    scope.map_or(true, |user| {
                        doc.uploaded_by == Some(user) || doc.links.user_id == Some(user)
                    })
                })
                .filter(|doc| {
                    filter
                        .category
                        .as_deref()
                        .map_or(true, |category| doc.category == category)
                })
                .filter(|doc| filter.building_id.map_or(true, |id| doc.links.building_id == Some(id)))
                .filter(|doc| filter.unit_id.map_or(true, |id| doc.links.unit_id == Some(id)))
                .filter(|doc| filter.lease_id.map_or(true, |id| doc.links.lease_id == Some(id)))
                .filter(|doc| filter.invoice_id.map_or(true, |id| doc.links.invoice_id == Some(id)))
                .filter(|doc| filter.user_id.map_or(true, |id| doc.links.user_id == Some(id)))
                .filter(|doc| filter.template_id.map_or(true, |id| doc.template_id == Some(id)))
                .filter(|doc| {
                    matches_search(
                        filter.search.as_deref(),
                        &[doc.title.as_str(), doc.original_name.as_str()],
                    )
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Page::paginate(rows, request))
    }

    pub fn get(&self, id: u64) -> Result<Document, ServiceError> {
        self.context
            .store()
            .read(|db| require(&db.documents, id).cloned())?
    }

    /// Store the file on the public disk, then record its metadata.
    ///
    /// The file is removed again when the record cannot be written.
    pub fn upload(
        &self,
        upload: DocumentUpload,
        uploaded_by: Option<u64>,
    ) -> Result<Document, ServiceError> {
        let mut errors = ValidationErrors::new();
        let title = upload.title.trim().to_string();
        let category = category_or_default(&upload.category);
        errors.required_max("title", &title, 255);
        errors.slug("category", &category);
        errors.max_len("category", &category, 50);
        if upload.bytes.is_empty() {
            errors.add("file", "The file field is required.");
        }
        errors.into_result()?;

        let name = sanitize_file_name(&upload.original_name);
        let mime_type = detect_mime(&upload.original_name, upload.content_type.as_deref());
        let now = self.context.now();
        let storage = self.context.storage();
        let path = put_unique(
            storage.as_ref(),
            now,
            &format!("documents/{category}"),
            &name,
            &upload.bytes,
        )?;

        let size_bytes = upload.bytes.len() as u64;
        let result = self.context.store().transaction(|db| {
            let mut errors = ValidationErrors::new();
            check_links(db, &upload.links, &mut errors);
            errors.into_result()?;
            Ok::<_, ServiceError>(db.documents.insert(now, |meta| Document {
                meta,
                title,
                category,
                path: path.clone(),
                original_name: upload.original_name.trim().to_string(),
                mime_type,
                size_bytes,
                uploaded_by,
                links: upload.links,
                template_id: None,
            }))
        });

        match result {
            Ok(document) => {
                info!(
                    document_id = document.meta.id,
                    path = %document.path,
                    size_bytes,
                    "document uploaded"
                );
                Ok(document)
            }
            Err(err) => {
                if let Err(cleanup) = storage.delete(&path) {
                    warn!(%path, error = %cleanup, "failed to remove orphaned upload");
                }
                Err(err)
            }
        }
    }

    pub fn update(&self, id: u64, changes: DocumentChanges) -> Result<Document, ServiceError> {
        let now = self.context.now();
        let document = self.context.store().transaction(|db| {
            require(&db.documents, id)?;
            let mut errors = ValidationErrors::new();
            let title = changes.title.trim().to_string();
            let category = category_or_default(&changes.category);
            errors.required_max("title", &title, 255);
            errors.slug("category", &category);
            check_links(db, &changes.links, &mut errors);
            errors.into_result()?;
            db.documents
                .update(id, now, |doc| {
                    doc.title = title;
                    doc.category = category;
                    doc.links = changes.links;
                })
                .ok_or_else(|| ServiceError::not_found::<Document>(id))
        })?;
        info!(document_id = id, "document updated");
        Ok(document)
    }

    /// Soft delete; the file stays on disk.
    pub fn delete(&self, id: u64) -> Result<Document, ServiceError> {
        let now = self.context.now();
        let document = self.context.store().transaction(|db| {
            require(&db.documents, id)?;
            db.documents
                .soft_delete(id, now)
                .ok_or_else(|| ServiceError::not_found::<Document>(id))
        })?;
        info!(document_id = id, "document deleted");
        Ok(document)
    }

    pub fn download(&self, id: u64) -> Result<(Document, Vec<u8>), ServiceError> {
        let document = self.get(id)?;
        let bytes = self.context.storage().get(&document.path)?;
        Ok((document, bytes))
    }

    /// Public URL of a stored document.
    pub fn url(&self, document: &Document) -> String {
        self.context.storage().url(&document.path)
    }

}

/// Write `contents` to `{dir}/{millis}-{name}`, bumping the timestamp while
/// the path is taken. Returns the path that was written.
pub(crate) fn put_unique(
    storage: &dyn FileStorage,
    now: DateTime<Utc>,
    dir: &str,
    name: &str,
    contents: &[u8],
) -> Result<String, StorageError> {
    let mut stamp = now.timestamp_millis();
    loop {
        let path = format!("{dir}/{stamp}-{name}");
        match storage.put(&path, contents) {
            Ok(()) => return Ok(path),
            Err(StorageError::AlreadyExists(_)) => stamp += 1,
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn category_or_default(raw: &str) -> String {
    match raw.trim() {
        "" => DEFAULT_CATEGORY.to_string(),
        category => category.to_string(),
    }
}

pub(crate) fn detect_mime(name: &str, declared: Option<&str>) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .or_else(|| {
            declared
                .and_then(|raw| raw.parse::<mime::Mime>().ok())
                .map(|mime| mime.essence_str().to_string())
        })
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// Every link must point at a live record.
pub(crate) fn check_links(db: &Database, links: &DocumentLinks, errors: &mut ValidationErrors) {
    let checks = [
        ("building_id", links.building_id.map(|id| db.buildings.contains(id))),
        ("unit_id", links.unit_id.map(|id| db.units.contains(id))),
        ("lease_id", links.lease_id.map(|id| db.leases.contains(id))),
        ("invoice_id", links.invoice_id.map(|id| db.invoices.contains(id))),
        ("payment_id", links.payment_id.map(|id| db.payments.contains(id))),
        ("user_id", links.user_id.map(|id| db.users.contains(id))),
    ];
    for (field, exists) in checks {
        if exists == Some(false) {
            errors.missing_reference(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::services::testing::Harness;

    fn upload(title: &str, name: &str, links: DocumentLinks) -> DocumentUpload {
        DocumentUpload {
            title: title.to_string(),
            category: "leases".to_string(),
            links,
            original_name: name.to_string(),
            bytes: b"%PDF-1.4 signed lease".to_vec(),
            content_type: None,
        }
    }

    #[test]
    fn upload_stores_the_file_and_download_returns_it() {
        let harness = Harness::new();
        let building = harness.building("Cedar Court").meta.id;
        let unit_id = harness.unit(building, "A1").meta.id;
        let documents = &harness.services.documents;
        let links = DocumentLinks {
            unit_id: Some(unit_id),
            ..DocumentLinks::default()
        };

        let doc = documents
            .upload(upload("Signed lease", "Lease A1 (signed).PDF", links), Some(1))
            .expect("upload");
        assert!(doc.path.starts_with("documents/leases/"));
        assert!(doc.path.ends_with("-lease-a1-signed-.pdf"));
        assert_eq!(doc.mime_type, "application/pdf");
        assert_eq!(doc.size_bytes, 21);
        assert!(harness.disk.exists(&doc.path));
        assert_eq!(documents.url(&doc), format!("/storage/{}", doc.path));

        let (found, bytes) = documents.download(doc.meta.id).expect("download");
        assert_eq!(found, doc);
        assert_eq!(bytes, b"%PDF-1.4 signed lease");
    }

    #[test]
    fn same_name_in_the_same_instant_gets_a_distinct_path() {
        let harness = Harness::new();
        let documents = &harness.services.documents;
        let first = documents
            .upload(upload("One", "scan.png", DocumentLinks::default()), None)
            .expect("first");
        let second = documents
            .upload(upload("Two", "scan.png", DocumentLinks::default()), None)
            .expect("second");
        assert_ne!(first.path, second.path);
        assert_eq!(second.mime_type, "image/png");
    }

    #[test]
    fn concurrent_uploads_of_one_name_keep_every_file() {
        let harness = Harness::new();
        let documents = &harness.services.documents;

        let uploaded: Vec<Document> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|n| {
                    scope.spawn(move || {
                        let mut form = upload(&format!("Copy {n}"), "same.pdf", DocumentLinks::default());
                        form.bytes = format!("%PDF copy {n}").into_bytes();
                        documents.upload(form, None).expect("upload")
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("worker"))
                .collect()
        });

        let mut paths: Vec<&str> = uploaded.iter().map(|doc| doc.path.as_str()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), 8);
        for doc in &uploaded {
            let (_, bytes) = documents.download(doc.meta.id).expect("download");
            let n = doc.title.trim_start_matches("Copy ");
            assert_eq!(bytes, format!("%PDF copy {n}").into_bytes());
        }
    }

    #[test]
    fn rejected_metadata_removes_the_stored_file() {
        let harness = Harness::new();
        let documents = &harness.services.documents;
        let links = DocumentLinks {
            lease_id: Some(99),
            ..DocumentLinks::default()
        };
        match documents.upload(upload("Orphan", "orphan.pdf", links), None) {
            Err(ServiceError::Validation(errors)) => assert!(errors.has("lease_id")),
            other => panic!("expected validation error, got {other:?}"),
        }
        let dir = harness.disk.root().join("documents/leases");
        let leftovers = std::fs::read_dir(&dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn validates_title_category_and_file() {
        let harness = Harness::new();
        let mut bad = upload("", "x.pdf", DocumentLinks::default());
        bad.category = "Lease Files".to_string();
        bad.bytes.clear();
        match harness.services.documents.upload(bad, None) {
            Err(ServiceError::Validation(errors)) => {
                assert!(errors.has("title"));
                assert!(errors.has("category"));
                assert!(errors.has("file"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_extensions_fall_back_to_the_declared_type() {
        assert_eq!(detect_mime("notes.unknownext", Some("text/plain; charset=utf-8")), "text/plain");
        assert_eq!(detect_mime("blob", None), FALLBACK_MIME);
        assert_eq!(detect_mime("blob", Some("not a mime")), FALLBACK_MIME);
    }

    #[test]
    fn residents_see_documents_they_uploaded_or_are_linked_to() {
        let harness = Harness::new();
        let tenant = harness.user("Wanjiru Tenant", Role::Tenant).meta.id;
        let documents = &harness.services.documents;
        documents
            .upload(upload("Mine", "a.pdf", DocumentLinks::default()), Some(tenant))
            .expect("upload");
        let linked = DocumentLinks {
            user_id: Some(tenant),
            ..DocumentLinks::default()
        };
        documents
            .upload(upload("About me", "b.pdf", linked), None)
            .expect("upload");
        let other = documents
            .upload(upload("Board minutes", "c.pdf", DocumentLinks::default()), None)
            .expect("upload");

        let filter = DocumentFilter::default();
        assert_eq!(documents.list(&filter, None).expect("list").total, 3);
        assert_eq!(documents.list(&filter, Some(tenant)).expect("list").total, 2);

        // Soft delete hides the record but keeps the file.
        documents.delete(other.meta.id).expect("delete");
        assert_eq!(documents.list(&filter, None).expect("list").total, 2);
        assert!(harness.disk.exists(&other.path));
        assert!(matches!(
            documents.download(other.meta.id),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn update_changes_metadata_only() {
        let harness = Harness::new();
        let documents = &harness.services.documents;
        let doc = documents
            .upload(upload("Draft", "a.pdf", DocumentLinks::default()), None)
            .expect("upload");
        let updated = documents
            .update(
                doc.meta.id,
                DocumentChanges {
                    title: "Final".to_string(),
                    category: String::new(),
                    links: DocumentLinks::default(),
                },
            )
            .expect("update");
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.category, DEFAULT_CATEGORY);
        assert_eq!(updated.path, doc.path);
    }
}
