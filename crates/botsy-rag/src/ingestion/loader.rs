//! Document loading: files and URLs to normalized text

use bytes::Bytes;

use crate::config::{IngestionConfig, MarkdownPolicy};
use crate::error::{Error, Result};
use crate::types::{DocumentOrigin, SourceKind};

use super::parser::{decode_text, extract_docx, extract_pdf, hash_content, strip_markdown};
use super::web::{extract_html, validate_url, WebFetcher};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// A document to ingest
#[derive(Debug, Clone)]
pub enum LoadInput {
    /// Uploaded file bytes
    File {
        filename: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
    /// Web page to fetch
    Url(String),
}

impl LoadInput {
    pub fn file(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::File {
            filename: filename.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Filename or URL, for logs and per-item results
    pub fn label(&self) -> &str {
        match self {
            Self::File { filename, .. } => filename,
            Self::Url(url) => url,
        }
    }
}

/// A span of extracted text, optionally tied to a page
#[derive(Debug, Clone, PartialEq)]
pub struct TextSection {
    pub page: Option<u32>,
    pub text: String,
}

impl TextSection {
    pub fn unpaged(text: impl Into<String>) -> Self {
        Self {
            page: None,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub source_kind: SourceKind,
    pub origin: DocumentOrigin,
    /// Filename, or canonical URL for web pages
    pub source_id: String,
    pub title: Option<String>,
    pub content_type: String,
    pub description: Option<String>,
    /// Size of the raw input
    pub byte_size: u64,
}

/// Loader output
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedText {
    pub sections: Vec<TextSection>,
    pub metadata: SourceMetadata,
}

impl NormalizedText {
    pub fn full_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_blank(&self) -> bool {
        self.sections.iter().all(|s| s.text.trim().is_empty())
    }

    pub fn content_hash(&self) -> String {
        hash_content(&self.full_text())
    }
}

/// Turns files and URLs into `NormalizedText`
pub struct DocumentLoader {
    web: WebFetcher,
    markdown: MarkdownPolicy,
}

impl DocumentLoader {
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        Ok(Self {
            web: WebFetcher::new(config)?,
            markdown: config.markdown,
        })
    }

    pub async fn load(&self, input: LoadInput) -> Result<NormalizedText> {
        match input {
            LoadInput::File {
                filename,
                content_type,
                bytes,
            } => {
                let markdown = self.markdown;
                tokio::task::spawn_blocking(move || {
                    load_file(&filename, content_type.as_deref(), &bytes, markdown)
                })
                .await?
            }
            LoadInput::Url(url) => self.load_url(&url).await,
        }
    }

    async fn load_url(&self, url: &str) -> Result<NormalizedText> {
        let requested = validate_url(url)?;
        let page = self.web.fetch(requested.as_str()).await?;
        let byte_size = page.body.len() as u64;

        if !page.is_html() {
            let content_type = page.content_type.clone().unwrap_or_default();
            let kind = kind_from_mime(&content_type);
            if let Some(kind @ (SourceKind::Pdf | SourceKind::Text | SourceKind::Markdown)) = kind {
                let final_url = page.final_url.clone();
                let markdown = self.markdown;
                let mut loaded = tokio::task::spawn_blocking(move || {
                    load_file(&final_url, Some(kind.mime_type()), &page.body, markdown)
                })
                .await??;
                loaded.metadata.origin = DocumentOrigin::Url;
                return Ok(loaded);
            }
            return Err(Error::UnsupportedFormat(format!(
                "{} served as '{}'",
                url, content_type
            )));
        }

        let html = extract_html(&page.body);
        let source_id = html.canonical_url.unwrap_or(page.final_url);

        tracing::info!("[{}] Extracted {} chars", source_id, html.text.len());

        Ok(NormalizedText {
            sections: sections_from(html.text),
            metadata: SourceMetadata {
                source_kind: SourceKind::Web,
                origin: DocumentOrigin::Url,
                source_id,
                title: html.title,
                content_type: SourceKind::Web.mime_type().to_string(),
                description: html.description,
                byte_size,
            },
        })
    }
}

/// Extract a file's text. Blocking: PDF and DOCX parsing are CPU-bound.
pub fn load_file(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
    markdown: MarkdownPolicy,
) -> Result<NormalizedText> {
    let kind = detect_format(filename, content_type, bytes)?;
    tracing::debug!("[{}] Detected format {}", filename, kind.as_str());

    let mut title = None;
    let mut description = None;
    let sections = match kind {
        SourceKind::Pdf => extract_pdf(filename, bytes)?,
        SourceKind::Docx => sections_from(extract_docx(filename, bytes)?),
        SourceKind::Text => sections_from(decode_text(bytes)),
        SourceKind::Markdown => {
            let text = decode_text(bytes);
            sections_from(match markdown {
                MarkdownPolicy::Keep => text,
                MarkdownPolicy::Strip => strip_markdown(&text),
            })
        }
        SourceKind::Html | SourceKind::Web => {
            let page = extract_html(bytes);
            title = page.title;
            description = page.description;
            sections_from(page.text)
        }
    };

    Ok(NormalizedText {
        sections,
        metadata: SourceMetadata {
            source_kind: kind,
            origin: DocumentOrigin::File,
            source_id: filename.to_string(),
            title,
            content_type: kind.mime_type().to_string(),
            description,
            byte_size: bytes.len() as u64,
        },
    })
}

fn sections_from(text: String) -> Vec<TextSection> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![TextSection::unpaged(text)]
    }
}

/// Declared content type, then magic bytes, then file extension
pub fn detect_format(filename: &str, content_type: Option<&str>, bytes: &[u8]) -> Result<SourceKind> {
    if let Some(kind) = content_type.and_then(kind_from_mime) {
        return Ok(kind);
    }

    if bytes.starts_with(b"%PDF") {
        return Ok(SourceKind::Pdf);
    }
    if bytes.starts_with(b"PK\x03\x04") && contains(bytes, b"word/") {
        return Ok(SourceKind::Docx);
    }

    mime_guess::from_path(filename)
        .iter_raw()
        .find_map(kind_from_mime)
        .ok_or_else(|| {
            let declared = content_type.unwrap_or("unknown type");
            Error::UnsupportedFormat(format!("{} ({})", filename, declared))
        })
}

fn kind_from_mime(mime: &str) -> Option<SourceKind> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "application/pdf" => Some(SourceKind::Pdf),
        DOCX_MIME => Some(SourceKind::Docx),
        "text/plain" => Some(SourceKind::Text),
        "text/markdown" | "text/x-markdown" => Some(SourceKind::Markdown),
        "text/html" | "application/xhtml+xml" => Some(SourceKind::Html),
        _ => None,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
