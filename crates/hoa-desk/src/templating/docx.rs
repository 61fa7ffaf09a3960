//! `.docx` templates with `{{placeholder}}` tokens.
//!
//! Word often splits a token across several runs
//! (`<w:t>{{ten</w:t></w:r><w:r><w:t>ant}}</w:t>`). Before extraction and
//! replacement each XML part is normalized so that every token sits inside a
//! single text node.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::TemplateError;

const DOCUMENT_PART: &str = "word/document.xml";

/// A parsed `.docx` package kept in memory.
#[derive(Debug, Clone)]
pub struct DocxTemplate {
    parts: Vec<(String, Vec<u8>)>,
}

/// Output of [`DocxTemplate::render`].
#[derive(Debug, Clone)]
pub struct RenderedDocx {
    pub bytes: Vec<u8>,
    /// Plain text of the body, one entry per paragraph.
    pub paragraphs: Vec<String>,
}

impl DocxTemplate {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| TemplateError::InvalidDocx(err.to_string()))?;

        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|err| TemplateError::InvalidDocx(err.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|err| TemplateError::InvalidDocx(err.to_string()))?;
            parts.push((name, contents));
        }

        if !parts.iter().any(|(name, _)| name == DOCUMENT_PART) {
            return Err(TemplateError::InvalidDocx(format!(
                "archive has no {DOCUMENT_PART}"
            )));
        }

        Ok(Self { parts })
    }

    /// Distinct placeholder names in body, headers and footers, sorted.
    pub fn placeholders(&self) -> Result<Vec<String>, TemplateError> {
        let mut names = BTreeSet::new();
        for (name, contents) in &self.parts {
            if !is_text_part(name) {
                continue;
            }
            let xml = part_text(name, contents)?;
            let normalized = normalize_placeholders(xml);
            for token in find_tokens(&normalized) {
                names.insert(token.name);
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Fill every placeholder. All names must be present in `values`.
    pub fn render(&self, values: &BTreeMap<String, String>) -> Result<RenderedDocx, TemplateError> {
        let missing: Vec<String> = self
            .placeholders()?
            .into_iter()
            .filter(|name| !values.contains_key(name))
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::MissingValues(missing));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut paragraphs = Vec::new();

        for (name, contents) in &self.parts {
            let output = if is_text_part(name) {
                let xml = part_text(name, contents)?;
                let filled = fill_placeholders(&normalize_placeholders(xml), values);
                if name == DOCUMENT_PART {
                    paragraphs = paragraph_texts(&filled);
                }
                filled.into_bytes()
            } else {
                contents.clone()
            };

            writer
                .start_file(name.as_str(), options)
                .map_err(|err| TemplateError::Write(err.to_string()))?;
            writer
                .write_all(&output)
                .map_err(|err| TemplateError::Write(err.to_string()))?;
        }

        let bytes = writer
            .finish()
            .map_err(|err| TemplateError::Write(err.to_string()))?
            .into_inner();

        Ok(RenderedDocx { bytes, paragraphs })
    }
}

fn is_text_part(name: &str) -> bool {
    name == DOCUMENT_PART
        || ((name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml"))
}

fn part_text<'a>(name: &str, contents: &'a [u8]) -> Result<&'a str, TemplateError> {
    std::str::from_utf8(contents)
        .map_err(|_| TemplateError::InvalidDocx(format!("{name} is not valid UTF-8")))
}

/// Byte ranges of XML text outside of markup.
fn text_ranges(xml: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut in_tag = false;
    for (index, byte) in xml.bytes().enumerate() {
        match byte {
            b'<' if !in_tag => {
                if index > start {
                    ranges.push((start, index));
                }
                in_tag = true;
            }
            b'>' if in_tag => {
                in_tag = false;
                start = index + 1;
            }
            _ => {}
        }
    }
    if !in_tag && start < xml.len() {
        ranges.push((start, xml.len()));
    }
    ranges
}

/// Collapse tokens split by markup so each `{{name}}` is contiguous text.
///
/// Markup inside a token is dropped only when it is balanced (every closing
/// tag is matched by an opening one), which holds for run boundaries.
pub(crate) fn normalize_placeholders(xml: &str) -> String {
    // Positions of every text byte, in document order.
    let positions: Vec<usize> = text_ranges(xml)
        .into_iter()
        .flat_map(|(start, end)| start..end)
        .collect();
    let text: Vec<u8> = positions.iter().map(|&pos| xml.as_bytes()[pos]).collect();

    let mut output = String::with_capacity(xml.len());
    let mut copied_until = 0;
    let mut cursor = 0;

    while let Some(open) = find_pair(&text, cursor, b'{') {
        let Some(close) = find_pair(&text, open + 2, b'}') else {
            break;
        };
        if let Some(nested) = find_pair(&text[..close], open + 2, b'{') {
            cursor = nested;
            continue;
        }

        let xml_start = positions[open];
        let xml_end = positions[close + 1] + 1;
        let span = &xml[xml_start..xml_end];

        if span.contains('<') && !crosses_paragraph(span) && markup_is_balanced(span) {
            output.push_str(&xml[copied_until..xml_start]);
            output.push_str("{{");
            output.push_str(&String::from_utf8_lossy(&text[open + 2..close]));
            output.push_str("}}");
            copied_until = xml_end;
        }
        cursor = close + 2;
    }

    output.push_str(&xml[copied_until..]);
    output
}

fn crosses_paragraph(span: &str) -> bool {
    span.contains("</w:p>") || span.contains("<w:p>") || span.contains("<w:p ")
}

fn find_pair(text: &[u8], from: usize, brace: u8) -> Option<usize> {
    if from >= text.len() {
        return None;
    }
    text[from..]
        .windows(2)
        .position(|pair| pair[0] == brace && pair[1] == brace)
        .map(|offset| from + offset)
}

fn markup_is_balanced(span: &str) -> bool {
    let mut depth: i32 = 0;
    let mut rest = span;
    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start..].find('>') else {
            return false;
        };
        let tag = &rest[start..start + end + 1];
        if tag.starts_with("</") {
            depth -= 1;
        } else if !tag.ends_with("/>") && !tag.starts_with("<?") && !tag.starts_with("<!") {
            depth += 1;
        }
        rest = &rest[start + end + 1..];
    }
    depth == 0
}

#[derive(Debug, PartialEq, Eq)]
struct Token {
    start: usize,
    end: usize,
    name: String,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Contiguous `{{ name }}` tokens in normalized XML.
fn find_tokens(xml: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut from = 0;
    while let Some(offset) = xml[from..].find("{{") {
        let start = from + offset;
        let Some(close_offset) = xml[start + 2..].find("}}") else {
            break;
        };
        let inner = &xml[start + 2..start + 2 + close_offset];
        let name = inner.trim();
        if !name.is_empty() && name.chars().all(is_name_char) {
            let end = start + 2 + close_offset + 2;
            tokens.push(Token {
                start,
                end,
                name: name.to_string(),
            });
            from = end;
        } else {
            from = start + 2;
        }
    }
    tokens
}

fn fill_placeholders(xml: &str, values: &BTreeMap<String, String>) -> String {
    let mut output = String::with_capacity(xml.len());
    let mut copied_until = 0;
    for token in find_tokens(xml) {
        if let Some(value) = values.get(&token.name) {
            output.push_str(&xml[copied_until..token.start]);
            output.push_str(&escape_xml(value));
            copied_until = token.end;
        }
    }
    output.push_str(&xml[copied_until..]);
    output
}

pub(crate) fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Text of each `<w:p>` paragraph; tabs and breaks become whitespace.
pub(crate) fn paragraph_texts(xml: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        if in_text {
            if let Some(paragraph) = current.as_mut() {
                paragraph.push_str(&unescape_xml(&rest[..start]));
            }
        }
        let Some(end) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start + 1..start + end];
        let tag_name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();
        let closing = tag.starts_with('/');
        let self_closing = tag.ends_with('/');

        match (tag_name, closing) {
            ("w:p", false) => {
                if self_closing {
                    paragraphs.push(String::new());
                } else {
                    current = Some(String::new());
                }
            }
            ("w:p", true) => {
                if let Some(paragraph) = current.take() {
                    paragraphs.push(paragraph);
                }
            }
            ("w:t", false) => in_text = !self_closing,
            ("w:t", true) => in_text = false,
            ("w:tab", false) => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.push('\t');
                }
            }
            ("w:br" | "w:cr", false) => {
                if let Some(paragraph) = current.as_mut() {
                    paragraph.push('\n');
                }
            }
            _ => {}
        }

        rest = &rest[start + end + 1..];
    }

    paragraphs
}
