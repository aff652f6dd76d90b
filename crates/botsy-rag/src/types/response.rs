//! Response types returned across the engine boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::ChatTurn;
use super::document::{Chunk, Document, DocumentOrigin, ScoredChunk, SourceKind};
use super::{BotId, ChunkId, DocumentId};

/// A reference from an answer back to the chunk that informed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedSource {
    pub document_id: DocumentId,
    pub chunk_id: ChunkId,
    /// Filename or URL
    pub source_id: String,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub snippet: String,
    pub score: f32,
}

/// How a chat reply was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// Model answered from retrieved context
    Answered,
    /// Nothing relevant in the knowledge base
    NoContext,
    /// Greeting shortcut, no retrieval
    Greeting,
    /// Model or store failed; apology returned
    Fallback,
}

/// Result of one chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub cited_sources: Vec<CitedSource>,
    pub outcome: ReplyOutcome,
    /// Turn to append to history (shows the visible text)
    pub user_turn: ChatTurn,
    pub assistant_turn: ChatTurn,
    pub chunks_retrieved: usize,
    pub processing_time_ms: u64,
}

/// Whether ingestion produced any knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Ingested,
    /// Source had no usable text; not an error
    Empty,
}

/// Successful ingestion of one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub document_id: DocumentId,
    pub chunk_count: usize,
    pub status: IngestStatus,
}

/// Per-item result of a batch ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestItemResult {
    /// Filename or URL as submitted
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<IngestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestItemResult {
    pub fn ok(source: impl Into<String>, outcome: IngestOutcome) -> Self {
        Self {
            source: source.into(),
            outcome: Some(outcome),
            reason_code: None,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: &crate::error::Error) -> Self {
        Self {
            source: source.into(),
            outcome: None,
            reason_code: Some(error.reason_code().to_string()),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Document metadata for the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub bot_id: BotId,
    pub origin: DocumentOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub title: Option<String>,
    pub content_type: String,
    pub byte_size: u64,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            bot_id: doc.bot_id,
            origin: doc.origin,
            filename: doc.filename().map(str::to_string),
            url: doc.url().map(str::to_string),
            title: doc.title.clone(),
            content_type: doc.content_type.clone(),
            byte_size: doc.byte_size,
            chunk_count: doc.chunk_count,
            ingested_at: doc.ingested_at,
        }
    }
}

/// Chunk metadata for the dashboard; never carries the vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub sequence: u32,
    pub source_kind: SourceKind,
    pub source_id: String,
    pub title: Option<String>,
    pub page: Option<u32>,
    pub text: String,
    pub char_count: usize,
}

impl From<&Chunk> for ChunkSummary {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id,
            document_id: chunk.document_id,
            sequence: chunk.sequence,
            source_kind: chunk.metadata.source_kind,
            source_id: chunk.metadata.source_id.clone(),
            title: chunk.metadata.title.clone(),
            page: chunk.metadata.page,
            text: chunk.text.clone(),
            char_count: chunk.text.chars().count(),
        }
    }
}

/// Raw retrieval hit for testing a bot's knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    #[serde(flatten)]
    pub chunk: ChunkSummary,
}

impl From<&ScoredChunk> for SearchHit {
    fn from(result: &ScoredChunk) -> Self {
        Self {
            score: result.score,
            chunk: ChunkSummary::from(&result.chunk),
        }
    }
}

/// Knowledge base totals for one bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub bot_id: BotId,
    pub document_count: usize,
    pub chunk_count: usize,
    pub total_bytes: u64,
    pub file_documents: usize,
    pub url_documents: usize,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

/// Result of deleting a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDeletion {
    pub document_id: DocumentId,
    pub chunks_deleted: usize,
}

/// Result of deleting a bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotDeletion {
    pub bot_id: BotId,
    pub documents_deleted: usize,
    pub chunks_deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::ChunkMetadata;

    #[test]
    fn test_chunk_summary_has_no_vector() {
        let chunk = Chunk {
            id: ChunkId::new(),
            document_id: DocumentId::new(),
            bot_id: BotId::new(),
            sequence: 0,
            text: "Our refund window is 30 days.".into(),
            embedding: vec![0.5; 8],
            metadata: ChunkMetadata {
                source_kind: SourceKind::Text,
                origin: DocumentOrigin::File,
                source_id: "policy.txt".into(),
                title: None,
                page: None,
            },
        };

        let json = serde_json::to_value(ChunkSummary::from(&chunk)).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["char_count"], 29);

        let raw = serde_json::to_value(&chunk).unwrap();
        assert!(raw.get("embedding").is_none());
    }
}
