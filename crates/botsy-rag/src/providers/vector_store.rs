//! Vector store trait for bot-scoped chunk storage and search
//!
//! Every operation takes the owning `BotId`; no operation spans bots.

use async_trait::async_trait;
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::types::{BotId, Chunk, DocumentId, ScoredChunk};

/// Trait for bot-scoped vector storage and similarity search
///
/// Implementations:
/// - `MemoryVectorStore`: per-bot shards in process memory
/// - `KnowledgeDb`: SQLite tables indexed on bot_id
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace one chunk
    async fn upsert(&self, bot_id: BotId, chunk: Chunk) -> Result<()>;

    /// Insert a document's chunks as one unit: all become visible or none do
    async fn upsert_batch(&self, bot_id: BotId, chunks: Vec<Chunk>) -> Result<()>;

    /// Remove every chunk of a document, returning how many were removed
    async fn delete_document(&self, bot_id: BotId, document_id: DocumentId) -> Result<usize>;

    /// Remove every chunk of a bot
    async fn delete_bot(&self, bot_id: BotId) -> Result<usize>;

    /// Nearest chunks by cosine similarity, best first
    async fn search(&self, bot_id: BotId, query: &[f32], top_k: usize)
        -> Result<Vec<ScoredChunk>>;

    /// All chunks of a bot in document/sequence order
    async fn list_chunks(&self, bot_id: BotId) -> Result<Vec<Chunk>>;

    /// Number of chunks stored for a bot
    async fn count(&self, bot_id: BotId) -> Result<usize>;

    /// Check if the store is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get store name for logging
    fn name(&self) -> &str;
}

/// Reject writes whose chunk owner differs from the scope
pub(crate) fn check_write_scope(bot_id: BotId, chunk: &Chunk) -> Result<()> {
    if chunk.bot_id != bot_id {
        tracing::error!(
            expected = %bot_id,
            found = %chunk.bot_id,
            chunk_id = %chunk.id,
            "chunk written under a foreign bot scope"
        );
        return Err(Error::TenantIsolationViolation {
            expected: bot_id,
            found: chunk.bot_id,
        });
    }
    Ok(())
}

/// Reject vectors that do not match the deployment dimension
pub(crate) fn check_dimensions(expected: usize, chunk: &Chunk) -> Result<()> {
    if chunk.embedding.len() != expected {
        return Err(Error::InvalidInput(format!(
            "chunk {} has {} dimensions, store expects {}",
            chunk.id,
            chunk.embedding.len(),
            expected
        )));
    }
    Ok(())
}

/// Verify every result belongs to the scope
pub(crate) fn check_results_scope(bot_id: BotId, results: &[ScoredChunk]) -> Result<()> {
    if let Some(foreign) = results.iter().find(|r| r.chunk.bot_id != bot_id) {
        tracing::error!(
            expected = %bot_id,
            found = %foreign.chunk.bot_id,
            chunk_id = %foreign.chunk.id,
            "search returned a chunk owned by another bot"
        );
        return Err(Error::TenantIsolationViolation {
            expected: bot_id,
            found: foreign.chunk.bot_id,
        });
    }
    Ok(())
}

/// Total order: score desc, then sequence, document id, chunk id
pub(crate) fn rank_order(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    compare_ranked(a.score, &a.chunk, b.score, &b.chunk)
}

/// `rank_order` over borrowed chunks
pub(crate) fn compare_ranked(a_score: f32, a: &Chunk, b_score: f32, b: &Chunk) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.sequence.cmp(&b.sequence))
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort, then keep the best `top_k`
pub(crate) fn rank_and_truncate(mut results: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    results.sort_by(rank_order);
    results.truncate(top_k);
    results
}
