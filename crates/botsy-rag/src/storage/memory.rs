//! In-memory vector store sharded per bot
//!
//! Each bot owns its own lock, so writes for one bot never block reads or
//! writes of another.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::providers::embedding::cosine_similarity;
use crate::providers::vector_store::{
    check_dimensions, check_results_scope, check_write_scope, compare_ranked, VectorStore,
};
use crate::types::{BotId, Chunk, DocumentId, ScoredChunk};

#[derive(Default)]
struct BotShard {
    /// Chunks per document, kept in sequence order
    documents: BTreeMap<DocumentId, Vec<Chunk>>,
}

impl BotShard {
    fn insert(&mut self, chunk: Chunk) {
        let chunks = self.documents.entry(chunk.document_id).or_default();
        match chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk,
            None => {
                let pos = chunks.partition_point(|c| c.sequence <= chunk.sequence);
                chunks.insert(pos, chunk);
            }
        }
    }

    fn len(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }
}

/// Process-local bot-scoped vector store
pub struct MemoryVectorStore {
    dimensions: usize,
    shards: DashMap<BotId, Arc<RwLock<BotShard>>>,
}

impl MemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            shards: DashMap::new(),
        }
    }

    fn shard(&self, bot_id: BotId) -> Option<Arc<RwLock<BotShard>>> {
        self.shards.get(&bot_id).map(|s| Arc::clone(s.value()))
    }

    fn shard_or_create(&self, bot_id: BotId) -> Arc<RwLock<BotShard>> {
        Arc::clone(self.shards.entry(bot_id).or_default().value())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, bot_id: BotId, chunk: Chunk) -> Result<()> {
        check_write_scope(bot_id, &chunk)?;
        check_dimensions(self.dimensions, &chunk)?;
        self.shard_or_create(bot_id).write().insert(chunk);
        Ok(())
    }

    async fn upsert_batch(&self, bot_id: BotId, chunks: Vec<Chunk>) -> Result<()> {
        for chunk in &chunks {
            check_write_scope(bot_id, chunk)?;
            check_dimensions(self.dimensions, chunk)?;
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let shard = self.shard_or_create(bot_id);
        let mut guard = shard.write();
        for chunk in chunks {
            guard.insert(chunk);
        }
        Ok(())
    }

    async fn delete_document(&self, bot_id: BotId, document_id: DocumentId) -> Result<usize> {
        Ok(self
            .shard(bot_id)
            .and_then(|shard| shard.write().documents.remove(&document_id))
            .map(|chunks| chunks.len())
            .unwrap_or(0))
    }

    async fn delete_bot(&self, bot_id: BotId) -> Result<usize> {
        Ok(self
            .shards
            .remove(&bot_id)
            .map(|(_, shard)| shard.read().len())
            .unwrap_or(0))
    }

    async fn search(
        &self,
        bot_id: BotId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(shard) = self.shard(bot_id) else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let results: Vec<ScoredChunk> = {
            let guard = shard.read();
            let mut scored: Vec<(f32, &Chunk)> = guard
                .documents
                .values()
                .flatten()
                .map(|chunk| (cosine_similarity(query, &chunk.embedding), chunk))
                .collect();
            scored.sort_by(|a, b| compare_ranked(a.0, a.1, b.0, b.1));

            // Only the survivors are cloned
            scored
                .into_iter()
                .take(top_k)
                .map(|(score, chunk)| ScoredChunk {
                    score,
                    chunk: chunk.clone(),
                })
                .collect()
        };

        check_results_scope(bot_id, &results)?;
        Ok(results)
    }

    async fn list_chunks(&self, bot_id: BotId) -> Result<Vec<Chunk>> {
        Ok(self
            .shard(bot_id)
            .map(|shard| shard.read().documents.values().flatten().cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, bot_id: BotId) -> Result<usize> {
        Ok(self.shard(bot_id).map(|s| s.read().len()).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
