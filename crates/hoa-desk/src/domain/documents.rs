use serde::{Deserialize, Serialize};

use crate::store::{impl_record, RecordMeta};

/// Optional references from a document to the records it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentLinks {
    pub building_id: Option<u64>,
    pub unit_id: Option<u64>,
    pub lease_id: Option<u64>,
    pub invoice_id: Option<u64>,
    pub payment_id: Option<u64>,
    pub user_id: Option<u64>,
}

/// Metadata for a file stored on the public disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub title: String,
    pub category: String,
    pub path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uploaded_by: Option<u64>,
    #[serde(flatten)]
    pub links: DocumentLinks,
    pub template_id: Option<u64>,
}

/// A `.docx` with `{{placeholder}}` tokens used to generate documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTemplate {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub path: String,
    pub original_name: String,
    pub placeholders: Vec<String>,
}

impl_record!(
    Document => "document",
    DocumentTemplate => "document template",
);
