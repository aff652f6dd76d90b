//! Ingestion pipeline: load, chunk, embed, store, register
//!
//! A document becomes visible only after all of its chunks are stored and
//! its record is registered. Any failure after the write started deletes the
//! document's chunks before the error is returned.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::embedding::{embed_batch_with_timeout, EmbeddingProvider};
use crate::providers::vector_store::VectorStore;
use crate::storage::Catalog;
use crate::types::{
    BotId, Chunk, Document, DocumentId, IngestOutcome, IngestStatus,
};

use super::chunker::TextChunker;
use super::loader::{DocumentLoader, LoadInput};

/// Pipeline stage, reported while a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Loading,
    Chunking,
    Embedding,
    Storing,
    Registering,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Storing => "storing",
            Self::Registering => "registering",
        }
    }
}

/// Ingestion pipeline shared by synchronous calls and background jobs
pub struct IngestPipeline {
    loader: DocumentLoader,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    catalog: Arc<Catalog>,
    embed_timeout: Duration,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        catalog: Arc<Catalog>,
    ) -> Result<Self> {
        Ok(Self {
            loader: DocumentLoader::new(&config.ingestion)?,
            chunker: TextChunker::from_config(&config.chunking),
            embedder,
            store,
            catalog,
            embed_timeout: Duration::from_secs(config.embeddings.timeout_secs),
            batch_size: config.embeddings.batch_size.max(1),
        })
    }

    /// Ingest one source under a fresh document id
    pub async fn ingest(&self, bot_id: BotId, input: LoadInput) -> Result<IngestOutcome> {
        self.ingest_as(bot_id, DocumentId::new(), input, |_| {}).await
    }

    /// Ingest one source under a caller-chosen document id
    pub async fn ingest_as<F>(
        &self,
        bot_id: BotId,
        document_id: DocumentId,
        input: LoadInput,
        on_stage: F,
    ) -> Result<IngestOutcome>
    where
        F: Fn(IngestStage) + Send + Sync,
    {
        if !self.catalog.contains_bot(bot_id) {
            return Err(Error::not_found("bot", bot_id));
        }

        let label = input.label().to_string();
        let start = Instant::now();
        tracing::info!("[{}] Starting ingestion for bot {}", label, bot_id);

        on_stage(IngestStage::Loading);
        let loaded = self.loader.load(input).await?;

        on_stage(IngestStage::Chunking);
        let drafts = self.chunker.chunk(&loaded);
        if drafts.is_empty() {
            tracing::info!("[{}] No usable text, nothing stored", label);
            return Ok(IngestOutcome {
                document_id,
                chunk_count: 0,
                status: IngestStatus::Empty,
            });
        }
        tracing::info!("[{}] Created {} chunks, generating embeddings...", label, drafts.len());

        on_stage(IngestStage::Embedding);
        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors =
                embed_batch_with_timeout(self.embedder.as_ref(), batch, self.embed_timeout)
                    .await
                    .inspect_err(|e| tracing::error!("[{}] Embedding failed: {}", label, e))?;
            embeddings.extend(vectors);
        }

        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .zip(embeddings)
            .map(|(draft, embedding)| Chunk::from_draft(bot_id, document_id, draft, embedding))
            .collect();
        let chunk_count = chunks.len();

        let document = Document {
            id: document_id,
            bot_id,
            origin: loaded.metadata.origin,
            source_id: loaded.metadata.source_id.clone(),
            title: loaded.metadata.title.clone(),
            content_type: loaded.metadata.content_type.clone(),
            byte_size: loaded.metadata.byte_size,
            content_hash: loaded.content_hash(),
            chunk_count,
            ingested_at: Utc::now(),
        };

        on_stage(IngestStage::Storing);
        tracing::info!("[{}] Storing {} chunks...", label, chunk_count);
        if let Err(e) = self.store.upsert_batch(bot_id, chunks).await {
            self.rollback(bot_id, document_id, &label).await;
            return Err(e);
        }

        on_stage(IngestStage::Registering);
        if let Err(e) = self.catalog.register_document(document) {
            self.rollback(bot_id, document_id, &label).await;
            return Err(e);
        }

        tracing::info!(
            "[{}] COMPLETE: {} chunks stored in {:.1}s",
            label,
            chunk_count,
            start.elapsed().as_secs_f64()
        );

        Ok(IngestOutcome {
            document_id,
            chunk_count,
            status: IngestStatus::Ingested,
        })
    }

    /// Remove any chunks written for a document that never became ready
    pub async fn rollback(&self, bot_id: BotId, document_id: DocumentId, label: &str) {
        match self.store.delete_document(bot_id, document_id).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!("[{}] Rolled back {} chunks", label, n),
            Err(e) => tracing::error!("[{}] Rollback failed: {}", label, e),
        }
    }

    /// Undo a finished ingestion: unregister the document, then drop its chunks
    pub async fn discard(&self, bot_id: BotId, document_id: DocumentId, label: &str) {
        match self.catalog.remove_document(bot_id, document_id) {
            Ok(_) | Err(Error::NotFound { .. }) => {}
            Err(e) => tracing::error!("[{}] Failed to unregister document: {}", label, e),
        }
        self.rollback(bot_id, document_id, label).await;
    }
}
