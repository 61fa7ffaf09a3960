//! Document templates: placeholder extraction, filling and PDF conversion.

mod docx;
mod pdf;

pub use docx::{DocxTemplate, RenderedDocx};
pub use pdf::{pdf_renderable, render_text_pdf};

#[cfg(test)]
pub(crate) use docx::tests::docx_with_body;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("file is not a readable .docx document: {0}")]
    InvalidDocx(String),
    #[error("missing values for placeholders: {}", .0.join(", "))]
    MissingValues(Vec<String>),
    #[error("failed to write generated document: {0}")]
    Write(String),
    #[error("character '{0}' cannot be rendered in a PDF")]
    Unrenderable(char),
}

/// Output formats for generated documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pdf,
    Docx,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => DOCX_MIME,
        }
    }
}

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
