//! Query-time retrieval over a bot's knowledge

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::providers::embedding::{embed_with_timeout, EmbeddingProvider};
use crate::providers::vector_store::VectorStore;
use crate::types::{BotId, ScoredChunk};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Knobs for one retrieval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// Results scoring below this are dropped
    pub min_score: f32,
    /// Keep only the best chunk per document
    pub diversify: bool,
}

impl RetrievalOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
            diversify: config.diversify,
        }
    }
}

/// Per-request overrides of the configured defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOverrides {
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub diversify: Option<bool>,
}

impl RetrievalOverrides {
    pub fn apply(&self, defaults: RetrievalOptions) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.top_k.unwrap_or(defaults.top_k),
            min_score: self.min_score.unwrap_or(defaults.min_score),
            diversify: self.diversify.unwrap_or(defaults.diversify),
        }
    }
}

/// Embeds queries and searches the bot-scoped store
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    defaults: RetrievalOptions,
    embed_timeout: Duration,
    oversample: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        retrieval: &RetrievalConfig,
        embeddings: &EmbeddingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            defaults: RetrievalOptions::from_config(retrieval),
            embed_timeout: Duration::from_secs(embeddings.timeout_secs),
            oversample: retrieval.oversample.max(1),
            max_retries: retrieval.max_retries,
            retry_backoff: Duration::from_millis(retrieval.retry_backoff_ms),
        }
    }

    pub fn defaults(&self) -> RetrievalOptions {
        self.defaults
    }

    /// Best chunks for a query, best first; empty is a valid answer
    pub async fn retrieve(
        &self,
        bot_id: BotId,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() || options.top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding =
            embed_with_timeout(self.embedder.as_ref(), query, self.embed_timeout).await?;

        let fetch_k = if options.diversify {
            options.top_k.saturating_mul(self.oversample)
        } else {
            options.top_k
        };
        let results = self.search_with_retry(bot_id, &query_embedding, fetch_k).await?;

        let mut seen_documents = HashSet::new();
        let selected: Vec<ScoredChunk> = results
            .into_iter()
            .filter(|r| r.score >= options.min_score)
            .filter(|r| !options.diversify || seen_documents.insert(r.chunk.document_id))
            .take(options.top_k)
            .collect();

        tracing::debug!(
            "Retrieved {} chunks for bot {} (top_k={}, min_score={})",
            selected.len(),
            bot_id,
            options.top_k,
            options.min_score
        );

        Ok(selected)
    }

    async fn search_with_retry(
        &self,
        bot_id: BotId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let mut attempt = 0;
        loop {
            match self.store.search(bot_id, query, top_k).await {
                Ok(results) => return Ok(results),
                Err(e @ Error::VectorStoreUnavailable(_)) if attempt < self.max_retries => {
                    let delay = self
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt))
                        .min(MAX_RETRY_DELAY);
                    tracing::warn!(
                        "{} search failed (attempt {}/{}): {}, retrying in {:?}",
                        self.store.name(),
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbedder;
    use crate::storage::memory::tests::make_chunk;
    use crate::storage::MemoryVectorStore;
    use crate::types::{Chunk, DocumentId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const DIMS: usize = 256;

    async fn seeded() -> (Retriever, Arc<MemoryVectorStore>, BotId, DocumentId) {
        let embedder = Arc::new(HashEmbedder::new(DIMS, 0));
        let store = Arc::new(MemoryVectorStore::new(DIMS));
        let bot = BotId::new();
        let refunds = DocumentId::new();
        let shipping = DocumentId::new();

        store
            .upsert_batch(
                bot,
                vec![
                    make_chunk(&embedder, bot, refunds, 0, "Our refund window is 30 days."),
                    make_chunk(&embedder, bot, refunds, 1, "Refunds go back to the original payment method."),
                    make_chunk(&embedder, bot, shipping, 0, "Shipping takes five business days."),
                ],
            )
            .await
            .unwrap();

        let retriever = Retriever::new(
            embedder,
            store.clone(),
            &RetrievalConfig::default(),
            &EmbeddingConfig::default(),
        );
        (retriever, store, bot, refunds)
    }

    #[tokio::test]
    async fn test_refund_query_retrieves_refund_chunk() {
        let (retriever, _, bot, refunds) = seeded().await;
        let results = retriever
            .retrieve(bot, "What is the refund policy?", &retriever.defaults())
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.document_id, refunds);
        assert!(results[0].score >= RetrievalConfig::default().min_score);
    }

    #[tokio::test]
    async fn test_min_score_filters_everything() {
        let (retriever, _, bot, _) = seeded().await;
        let options = RetrievalOptions {
            min_score: 0.99,
            ..retriever.defaults()
        };
        let results = retriever
            .retrieve(bot, "completely unrelated astronomy", &options)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_diversify_one_chunk_per_document() {
        let (retriever, _, bot, _) = seeded().await;
        let options = RetrievalOptions {
            top_k: 5,
            min_score: -1.0,
            diversify: true,
        };
        let results = retriever.retrieve(bot, "refund", &options).await.unwrap();

        let docs: HashSet<DocumentId> = results.iter().map(|r| r.chunk.document_id).collect();
        assert_eq!(docs.len(), results.len());
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_bot_and_blank_query() {
        let (retriever, _, bot, _) = seeded().await;
        assert!(retriever
            .retrieve(BotId::new(), "refund", &retriever.defaults())
            .await
            .unwrap()
            .is_empty());
        assert!(retriever
            .retrieve(bot, "   ", &retriever.defaults())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_overrides() {
        let defaults = RetrievalOptions::from_config(&RetrievalConfig::default());
        let applied = RetrievalOverrides {
            top_k: Some(2),
            diversify: Some(true),
            ..Default::default()
        }
        .apply(defaults);
        assert_eq!(applied.top_k, 2);
        assert!(applied.diversify);
        assert_eq!(applied.min_score, defaults.min_score);
    }

    struct FlakyStore {
        inner: MemoryVectorStore,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn upsert(&self, bot_id: BotId, chunk: Chunk) -> Result<()> {
            self.inner.upsert(bot_id, chunk).await
        }
        async fn upsert_batch(&self, bot_id: BotId, chunks: Vec<Chunk>) -> Result<()> {
            self.inner.upsert_batch(bot_id, chunks).await
        }
        async fn delete_document(&self, bot_id: BotId, document_id: DocumentId) -> Result<usize> {
            self.inner.delete_document(bot_id, document_id).await
        }
        async fn delete_bot(&self, bot_id: BotId) -> Result<usize> {
            self.inner.delete_bot(bot_id).await
        }
        async fn search(&self, bot_id: BotId, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(Error::store_unavailable("database is locked"));
            }
            self.inner.search(bot_id, query, top_k).await
        }
        async fn list_chunks(&self, bot_id: BotId) -> Result<Vec<Chunk>> {
            self.inner.list_chunks(bot_id).await
        }
        async fn count(&self, bot_id: BotId) -> Result<usize> {
            self.inner.count(bot_id).await
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_unavailability_retried_then_surfaced() {
        let embedder = Arc::new(HashEmbedder::new(DIMS, 0));
        let bot = BotId::new();
        let inner = MemoryVectorStore::new(DIMS);
        inner
            .upsert(bot, make_chunk(&embedder, bot, DocumentId::new(), 0, "refund window"))
            .await
            .unwrap();
        let store = Arc::new(FlakyStore {
            inner,
            failures_left: AtomicU32::new(2),
        });

        let config = RetrievalConfig {
            max_retries: 2,
            ..Default::default()
        };
        let retriever = Retriever::new(embedder, store.clone(), &config, &EmbeddingConfig::default());
        let options = RetrievalOptions {
            min_score: -1.0,
            ..retriever.defaults()
        };

        assert_eq!(retriever.retrieve(bot, "refund", &options).await.unwrap().len(), 1);

        store.failures_left.store(3, Ordering::SeqCst);
        let err = retriever.retrieve(bot, "refund", &options).await.unwrap_err();
        assert_eq!(err.reason_code(), "vector_store_unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_retry_chain_backoff_is_capped() {
        let embedder = Arc::new(HashEmbedder::new(DIMS, 0));
        let bot = BotId::new();
        let inner = MemoryVectorStore::new(DIMS);
        inner
            .upsert(bot, make_chunk(&embedder, bot, DocumentId::new(), 0, "refund window"))
            .await
            .unwrap();
        let store = Arc::new(FlakyStore {
            inner,
            failures_left: AtomicU32::new(35),
        });

        let config = RetrievalConfig {
            max_retries: 40,
            ..Default::default()
        };
        let retriever = Retriever::new(embedder, store, &config, &EmbeddingConfig::default());
        let options = RetrievalOptions {
            min_score: -1.0,
            ..retriever.defaults()
        };

        let started = tokio::time::Instant::now();
        assert_eq!(retriever.retrieve(bot, "refund", &options).await.unwrap().len(), 1);
        assert!(started.elapsed() <= MAX_RETRY_DELAY * 35);
    }
}
