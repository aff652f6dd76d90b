//! Document and chunk types with source tracking for citations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BotId, ChunkId, DocumentId};

/// Where a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentOrigin {
    File,
    Url,
}

impl DocumentOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "url" => Self::Url,
            _ => Self::File,
        }
    }
}

/// Extracted format of the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Docx,
    Text,
    Markdown,
    Html,
    Web,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Web => "web",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "markdown" => Self::Markdown,
            "html" => Self::Html,
            "web" => Self::Web,
            _ => Self::Text,
        }
    }

    /// Canonical MIME type recorded on the document
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html | Self::Web => "text/html",
        }
    }
}

/// An ingested document. Immutable except for deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub bot_id: BotId,
    pub origin: DocumentOrigin,
    /// Original filename (file origin) or canonical URL (url origin)
    pub source_id: String,
    pub title: Option<String>,
    pub content_type: String,
    pub byte_size: u64,
    /// SHA-256 of the extracted text
    pub content_hash: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn filename(&self) -> Option<&str> {
        match self.origin {
            DocumentOrigin::File => Some(&self.source_id),
            DocumentOrigin::Url => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self.origin {
            DocumentOrigin::Url => Some(&self.source_id),
            DocumentOrigin::File => None,
        }
    }
}

/// Source metadata carried by every chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_kind: SourceKind,
    pub origin: DocumentOrigin,
    /// Filename or URL
    pub source_id: String,
    pub title: Option<String>,
    pub page: Option<u32>,
}

impl ChunkMetadata {
    /// Human-readable reference used in prompts and citations
    pub fn display_ref(&self) -> String {
        let mut parts = vec![self.source_id.clone()];
        if let Some(title) = &self.title {
            if title != &self.source_id {
                parts.push(title.clone());
            }
        }
        if let Some(page) = self.page {
            parts.push(format!("Page {}", page));
        }
        parts.join(", ")
    }
}

/// Chunker output before embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub sequence: u32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk of document text with its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    /// Denormalized owner for scoped search
    pub bot_id: BotId,
    pub sequence: u32,
    pub text: String,
    #[serde(skip_serializing, default)]
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn from_draft(
        bot_id: BotId,
        document_id: DocumentId,
        draft: ChunkDraft,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: ChunkId::new(),
            document_id,
            bot_id,
            sequence: draft.sequence,
            text: draft.text,
            embedding,
            metadata: draft.metadata,
        }
    }
}

/// Search hit with its cosine similarity
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Higher is more relevant
    pub score: f32,
}
