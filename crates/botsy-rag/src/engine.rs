//! Engine facade tying catalog, ingestion, retrieval and answering together

use dashmap::DashSet;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::chat::{ChatRequest, SessionStore};
use crate::config::{EmbeddingBackend, LlmBackend, RagConfig, VectorBackend};
use crate::error::{Error, Result};
use crate::generation::{AnswerComposer, ComposedAnswer};
use crate::ingestion::{IngestPipeline, IngestSource};
use crate::processing::{IngestionHandle, IngestionQueue, IngestionWorker, JobProgress, QueueStats};
use crate::providers::{
    EmbeddingProvider, HashEmbedder, LlmProvider, OllamaEmbedder, OllamaLlm,
    OpenAiCompatibleLlm, VectorStore,
};
use crate::retrieval::{RetrievalOverrides, Retriever};
use crate::storage::{Catalog, KnowledgeDb, MemoryVectorStore};
use crate::types::{
    Bot, BotDeletion, BotDraft, BotId, BotUpdate, ChatReply, ChatTurn, ChunkSummary,
    DocumentDeletion, DocumentId, DocumentOrigin, DocumentSummary, IngestItemResult,
    IngestOutcome, JobId, KnowledgeStats, SearchHit, SessionId, TenantId, TurnInput,
};

/// Provider and storage handles the engine is assembled from
pub struct EngineComponents {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub store: Arc<dyn VectorStore>,
    pub catalog: Arc<Catalog>,
}

impl EngineComponents {
    /// Build providers and storage selected by the configuration
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.provider {
            EmbeddingBackend::Hash => Arc::new(HashEmbedder::from_config(&config.embeddings)),
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(&config.embeddings)?),
        };
        if embedder.dimensions() != config.embeddings.dimensions {
            return Err(Error::Config(format!(
                "embedder {} produces {} dimensions, configured {}",
                embedder.model_id(),
                embedder.dimensions(),
                config.embeddings.dimensions
            )));
        }

        let llm: Arc<dyn LlmProvider> = match config.llm.provider {
            LlmBackend::Ollama => Arc::new(OllamaLlm::new(&config.llm)?),
            LlmBackend::OpenAi => Arc::new(OpenAiCompatibleLlm::new(&config.llm)?),
        };

        let dimensions = config.embeddings.dimensions;
        let (store, catalog): (Arc<dyn VectorStore>, Catalog) = match config.vector_db.backend {
            VectorBackend::Memory => (Arc::new(MemoryVectorStore::new(dimensions)), Catalog::in_memory()),
            VectorBackend::Sqlite => {
                let db = KnowledgeDb::new(&config.vector_db.storage_path, dimensions)?;
                tracing::info!("Knowledge database at {}", config.vector_db.storage_path.display());
                db.bind_embedding_model(&embedder.model_id())?;
                let purged = db.purge_orphaned_chunks()?;
                if purged > 0 {
                    tracing::warn!("Purged {} chunks left behind by deleted bots", purged);
                }
                let catalog = Catalog::with_database(db.clone())?;
                (Arc::new(db), catalog)
            }
        };

        Ok(Self {
            embedder,
            llm,
            store,
            catalog: Arc::new(catalog),
        })
    }
}

/// Provider health for readiness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    pub vector_store: bool,
    pub embedder: bool,
    pub llm: bool,
}

impl EngineHealth {
    /// Ingestion and retrieval work; the model may still be down
    pub fn is_ready(&self) -> bool {
        self.vector_store && self.embedder
    }
}

/// Multi-tenant RAG engine
pub struct RagEngine {
    config: RagConfig,
    catalog: Arc<Catalog>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    pipeline: Arc<IngestPipeline>,
    retriever: Retriever,
    composer: AnswerComposer,
    queue: Arc<IngestionQueue>,
    sessions: SessionStore,
    /// Bots unregistered whose chunks may still be in the store
    purging: DashSet<BotId>,
}

impl RagEngine {
    /// Build an engine from configuration and start its ingestion worker
    pub async fn new(config: RagConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            "Initializing RAG engine (embeddings: {:?}, llm: {:?}, store: {:?})...",
            config.embeddings.provider,
            config.llm.provider,
            config.vector_db.backend
        );
        let components = EngineComponents::from_config(&config)?;
        Self::with_components(config, components).await
    }

    /// Build an engine around caller-supplied providers
    pub async fn with_components(config: RagConfig, components: EngineComponents) -> Result<Self> {
        let EngineComponents {
            embedder,
            llm,
            store,
            catalog,
        } = components;

        let pipeline = Arc::new(IngestPipeline::new(
            &config,
            embedder.clone(),
            store.clone(),
            catalog.clone(),
        )?);
        let retriever = Retriever::new(
            embedder.clone(),
            store.clone(),
            &config.retrieval,
            &config.embeddings,
        );
        let composer = AnswerComposer::new(llm, &config.composer, &config.llm);

        let (queue, receiver) = IngestionQueue::new(config.processing.queue_capacity);
        let queue = Arc::new(queue.with_retention(
            Duration::from_secs(config.processing.job_retention_secs),
            config.processing.max_finished_jobs,
        ));
        IngestionWorker::new(pipeline.clone(), queue.clone(), &config.processing).spawn(receiver);

        tracing::info!(
            "RAG engine ready ({} store, {} embedder, {} llm)",
            store.name(),
            embedder.name(),
            composer.llm().name()
        );

        let sessions = SessionStore::with_limits(&config.sessions);
        Ok(Self {
            config,
            catalog,
            store,
            embedder,
            pipeline,
            retriever,
            composer,
            queue,
            sessions,
            purging: DashSet::new(),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    // ==================== Bots ====================

    pub fn create_bot(&self, tenant_id: TenantId, draft: BotDraft) -> Result<Bot> {
        let bot = self.catalog.create_bot(tenant_id, draft)?;
        tracing::info!("Created bot {} ({}) for tenant {}", bot.id, bot.name, tenant_id);
        Ok(bot)
    }

    pub fn get_bot(&self, bot_id: BotId) -> Result<Bot> {
        self.catalog.bot(bot_id)
    }

    pub fn update_bot(&self, bot_id: BotId, update: BotUpdate) -> Result<Bot> {
        self.catalog.update_bot(bot_id, update)
    }

    pub fn list_bots(&self, tenant_id: TenantId) -> Vec<Bot> {
        self.catalog.bots_for_tenant(tenant_id)
    }

    /// Delete a bot with its documents, chunks, sessions and pending jobs.
    ///
    /// If the chunk purge fails the bot stays unregistered, and calling this
    /// again finishes the purge.
    pub async fn delete_bot(&self, bot_id: BotId) -> Result<BotDeletion> {
        for job in self.queue.jobs_for_bot(bot_id) {
            if !job.status.is_terminal() {
                self.queue.cancel(job.job_id);
            }
        }

        // Unregister first so in-flight ingestion fails registration and rolls back
        let documents = match self.catalog.remove_bot(bot_id) {
            Ok(documents) => {
                self.purging.insert(bot_id);
                documents
            }
            Err(Error::NotFound { .. }) if self.purging.contains(&bot_id) => Vec::new(),
            Err(e) => return Err(e),
        };
        self.sessions.remove_bot(bot_id);

        let chunks_deleted = self.store.delete_bot(bot_id).await.map_err(|e| {
            tracing::error!("Chunk purge for deleted bot {} failed: {}", bot_id, e);
            e
        })?;
        self.purging.remove(&bot_id);

        tracing::info!(
            "Deleted bot {}: {} documents, {} chunks",
            bot_id,
            documents.len(),
            chunks_deleted
        );
        Ok(BotDeletion {
            bot_id,
            documents_deleted: documents.len(),
            chunks_deleted,
        })
    }

    // ==================== Ingestion ====================

    pub async fn ingest(&self, bot_id: BotId, source: IngestSource) -> Result<IngestOutcome> {
        self.pipeline.ingest(bot_id, source).await
    }

    /// Ingest sources concurrently; one failure never affects the others
    pub async fn ingest_batch(
        &self,
        bot_id: BotId,
        sources: Vec<IngestSource>,
    ) -> Result<Vec<IngestItemResult>> {
        self.ensure_bot(bot_id)?;

        let semaphore = Semaphore::new(self.config.processing.workers());
        let futures = sources.into_iter().map(|source| {
            let semaphore = &semaphore;
            async move {
                let label = source.label().to_string();
                let _permit = semaphore.acquire().await;
                match self.pipeline.ingest(bot_id, source).await {
                    Ok(outcome) => IngestItemResult::ok(label, outcome),
                    Err(e) => {
                        tracing::warn!("[{}] Ingestion failed: {}", label, e);
                        IngestItemResult::failed(label, &e)
                    }
                }
            }
        });

        let results = join_all(futures).await;
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        tracing::info!(
            "Batch ingestion for bot {}: {} ok, {} failed",
            bot_id,
            results.len() - failed,
            failed
        );
        Ok(results)
    }

    /// Queue a source for background ingestion
    pub async fn submit_ingestion(&self, bot_id: BotId, source: IngestSource) -> Result<IngestionHandle> {
        self.ensure_bot(bot_id)?;
        self.queue.submit(bot_id, source).await
    }

    pub fn ingestion_status(&self, job_id: JobId) -> Option<JobProgress> {
        self.queue.status(job_id)
    }

    pub fn cancel_ingestion(&self, job_id: JobId) -> bool {
        self.queue.cancel(job_id)
    }

    pub fn ingestion_jobs(&self, bot_id: BotId) -> Vec<JobProgress> {
        self.queue.jobs_for_bot(bot_id)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Delete a document's chunks, then its record; a failed chunk delete leaves both
    pub async fn delete_document(&self, bot_id: BotId, document_id: DocumentId) -> Result<DocumentDeletion> {
        let document = self.catalog.document(bot_id, document_id)?;
        let chunks_deleted = self.store.delete_document(bot_id, document_id).await?;
        self.catalog.remove_document(bot_id, document_id)?;

        tracing::info!(
            "[{}] Deleted document {} ({} chunks)",
            document.source_id,
            document_id,
            chunks_deleted
        );
        Ok(DocumentDeletion {
            document_id,
            chunks_deleted,
        })
    }

    // ==================== Chat ====================

    /// Answer one turn against the bot's knowledge
    pub async fn chat(&self, bot_id: BotId, request: ChatRequest) -> Result<ChatReply> {
        let bot = self.catalog.bot(bot_id)?;
        let start = Instant::now();
        let ChatRequest { history, input } = request;

        if input.effective_prompt.trim().is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }

        let (composed, chunks_retrieved) = match self.composer.shortcut(&bot, &input) {
            Some(greeting) => (greeting, 0),
            None => self.answer(&bot, &history, &input).await,
        };

        let user_turn = ChatTurn::user(input.visible_text.clone());
        let assistant_turn =
            ChatTurn::assistant(composed.answer_text.clone(), composed.cited_sources.clone());

        Ok(ChatReply {
            answer: composed.answer_text,
            cited_sources: composed.cited_sources,
            outcome: composed.outcome,
            user_turn,
            assistant_turn,
            chunks_retrieved,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn answer(&self, bot: &Bot, history: &[ChatTurn], input: &TurnInput) -> (ComposedAnswer, usize) {
        let options = self.retriever.defaults();
        match self
            .retriever
            .retrieve(bot.id, &input.effective_prompt, &options)
            .await
        {
            Ok(retrieved) => {
                let composed = self.composer.compose(bot, history, &retrieved, input).await;
                (composed, retrieved.len())
            }
            Err(e) => {
                tracing::error!("Retrieval failed for bot {} [{}]: {}", bot.id, e.reason_code(), e);
                (self.composer.fallback(), 0)
            }
        }
    }

    /// Chat with history held in the session store
    pub async fn chat_in_session(
        &self,
        bot_id: BotId,
        session_id: SessionId,
        input: TurnInput,
    ) -> Result<ChatReply> {
        self.ensure_bot(bot_id)?;
        let session = self.sessions.open(session_id, bot_id)?;
        let mut turns = session.lock().await;

        let reply = self
            .chat(bot_id, ChatRequest::new(input).with_history(turns.clone()))
            .await?;

        session.push_exchange(&mut turns, reply.user_turn.clone(), reply.assistant_turn.clone());
        Ok(reply)
    }

    pub async fn session_history(&self, session_id: SessionId) -> Result<Vec<ChatTurn>> {
        self.sessions.history(session_id).await
    }

    pub fn clear_session(&self, session_id: SessionId) -> bool {
        self.sessions.clear(session_id)
    }

    // ==================== Introspection ====================

    pub fn list_documents(&self, bot_id: BotId) -> Result<Vec<DocumentSummary>> {
        self.ensure_bot(bot_id)?;
        Ok(self
            .catalog
            .documents_for_bot(bot_id)
            .iter()
            .map(DocumentSummary::from)
            .collect())
    }

    pub async fn list_chunks(&self, bot_id: BotId) -> Result<Vec<ChunkSummary>> {
        self.ensure_bot(bot_id)?;
        let chunks = self.store.list_chunks(bot_id).await?;
        Ok(chunks.iter().map(ChunkSummary::from).collect())
    }

    pub async fn knowledge_stats(&self, bot_id: BotId) -> Result<KnowledgeStats> {
        self.ensure_bot(bot_id)?;
        let documents = self.catalog.documents_for_bot(bot_id);
        let chunk_count = self.store.count(bot_id).await?;

        Ok(KnowledgeStats {
            bot_id,
            document_count: documents.len(),
            chunk_count,
            total_bytes: documents.iter().map(|d| d.byte_size).sum(),
            file_documents: documents.iter().filter(|d| d.origin == DocumentOrigin::File).count(),
            url_documents: documents.iter().filter(|d| d.origin == DocumentOrigin::Url).count(),
            last_ingested_at: documents.iter().map(|d| d.ingested_at).max(),
        })
    }

    /// Raw retrieval without generation
    pub async fn search(
        &self,
        bot_id: BotId,
        query: &str,
        overrides: RetrievalOverrides,
    ) -> Result<Vec<SearchHit>> {
        self.ensure_bot(bot_id)?;
        let options = overrides.apply(self.retriever.defaults());
        let results = self.retriever.retrieve(bot_id, query, &options).await?;
        Ok(results.iter().map(SearchHit::from).collect())
    }

    pub async fn health(&self) -> EngineHealth {
        let (vector_store, embedder, llm) = tokio::join!(
            self.store.health_check(),
            self.embedder.health_check(),
            self.composer.llm().health_check(),
        );
        EngineHealth {
            vector_store: vector_store.unwrap_or(false),
            embedder: embedder.unwrap_or(false),
            llm: llm.unwrap_or(false),
        }
    }

    fn ensure_bot(&self, bot_id: BotId) -> Result<()> {
        if self.catalog.contains_bot(bot_id) {
            Ok(())
        } else {
            Err(Error::not_found("bot", bot_id))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::generation::composer::tests::ScriptedLlm;
    use crate::ingestion::LoadInput;
    use crate::processing::JobStatus;
    use crate::types::{Chunk, IngestStatus, MenuOption, ReplyOutcome, Role, ScoredChunk};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub(crate) struct TestEngine {
        pub engine: RagEngine,
        pub llm: Arc<ScriptedLlm>,
    }

    pub(crate) async fn test_engine(llm: ScriptedLlm) -> TestEngine {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 256;
        config.vector_db.backend = VectorBackend::Memory;

        let llm = Arc::new(llm);
        let components = EngineComponents {
            embedder: Arc::new(HashEmbedder::from_config(&config.embeddings)),
            llm: llm.clone(),
            store: Arc::new(MemoryVectorStore::new(256)),
            catalog: Arc::new(Catalog::in_memory()),
        };
        TestEngine {
            engine: RagEngine::with_components(config, components).await.unwrap(),
            llm,
        }
    }

    /// Deletes fail until the failure budget is spent
    struct FailingDeletes {
        inner: MemoryVectorStore,
        failures_left: AtomicU32,
    }

    impl FailingDeletes {
        fn take_failure(&self) -> Result<()> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(Error::store_unavailable("database is locked"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VectorStore for FailingDeletes {
        async fn upsert(&self, bot_id: BotId, chunk: Chunk) -> Result<()> {
            self.inner.upsert(bot_id, chunk).await
        }
        async fn upsert_batch(&self, bot_id: BotId, chunks: Vec<Chunk>) -> Result<()> {
            self.inner.upsert_batch(bot_id, chunks).await
        }
        async fn delete_document(&self, bot_id: BotId, document_id: DocumentId) -> Result<usize> {
            self.take_failure()?;
            self.inner.delete_document(bot_id, document_id).await
        }
        async fn delete_bot(&self, bot_id: BotId) -> Result<usize> {
            self.take_failure()?;
            self.inner.delete_bot(bot_id).await
        }
        async fn search(&self, bot_id: BotId, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
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
            "failing-deletes"
        }
    }

    async fn engine_with_failing_deletes(failures: u32) -> (RagEngine, Arc<FailingDeletes>) {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 256;
        config.vector_db.backend = VectorBackend::Memory;

        let store = Arc::new(FailingDeletes {
            inner: MemoryVectorStore::new(256),
            failures_left: AtomicU32::new(failures),
        });
        let components = EngineComponents {
            embedder: Arc::new(HashEmbedder::from_config(&config.embeddings)),
            llm: Arc::new(ScriptedLlm::answering("unused")),
            store: store.clone(),
            catalog: Arc::new(Catalog::in_memory()),
        };
        let engine = RagEngine::with_components(config, components).await.unwrap();
        (engine, store)
    }

    fn new_bot(engine: &RagEngine, name: &str) -> BotId {
        engine
            .create_bot(TenantId::new(), BotDraft::named(name))
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_refund_answer_cites_document() {
        let t = test_engine(ScriptedLlm::answering("Refunds are accepted within 30 days [Source 1].")).await;
        let bot = new_bot(&t.engine, "Acme Helper");

        let outcome = t
            .engine
            .ingest(bot, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();

        let reply = t
            .engine
            .chat(bot, ChatRequest::new(TurnInput::text("What is the refund policy?")))
            .await
            .unwrap();

        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert!(reply.answer.contains("30 days"));
        assert_eq!(reply.cited_sources.len(), 1);
        assert_eq!(reply.cited_sources[0].document_id, outcome.document_id);
        assert!(reply.chunks_retrieved >= 1);
    }

    #[tokio::test]
    async fn test_bot_without_documents_gets_no_context_answer() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let bot = new_bot(&t.engine, "Empty");

        let reply = t
            .engine
            .chat(bot, ChatRequest::new(TurnInput::text("What's the capital of France?")))
            .await
            .unwrap();

        assert_eq!(reply.outcome, ReplyOutcome::NoContext);
        assert!(reply.cited_sources.is_empty());
        assert_eq!(t.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_bots_never_see_each_others_knowledge() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let a = new_bot(&t.engine, "A");
        let b = new_bot(&t.engine, "B");

        t.engine
            .ingest(a, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();

        let overrides = RetrievalOverrides {
            min_score: Some(-1.0),
            ..Default::default()
        };
        assert!(t.engine.search(b, "refund window", overrides).await.unwrap().is_empty());
        assert_eq!(t.engine.search(a, "refund window", overrides).await.unwrap().len(), 1);

        let reply = t
            .engine
            .chat(b, ChatRequest::new(TurnInput::text("What is the refund window?")))
            .await
            .unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::NoContext);
    }

    #[tokio::test]
    async fn test_delete_document_then_reingest() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let bot = new_bot(&t.engine, "Docs");

        let refunds = t
            .engine
            .ingest(bot, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();
        let shipping = t
            .engine
            .ingest(bot, LoadInput::file("shipping.txt", "Shipping takes five business days."))
            .await
            .unwrap();

        let deletion = t.engine.delete_document(bot, refunds.document_id).await.unwrap();
        assert_eq!(deletion.chunks_deleted, 1);

        let chunks = t.engine.list_chunks(bot).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].document_id, shipping.document_id);

        let again = t
            .engine
            .ingest(bot, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();
        assert_ne!(again.document_id, refunds.document_id);
        assert_eq!(t.engine.list_chunks(bot).await.unwrap().len(), 2);

        let err = t.engine.delete_document(bot, refunds.document_id).await.unwrap_err();
        assert_eq!(err.reason_code(), "not_found");
    }

    #[tokio::test]
    async fn test_delete_document_of_other_bot_is_not_found() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let a = new_bot(&t.engine, "A");
        let b = new_bot(&t.engine, "B");
        let doc = t
            .engine
            .ingest(a, LoadInput::file("a.txt", "Knowledge that belongs to bot A."))
            .await
            .unwrap();

        let err = t.engine.delete_document(b, doc.document_id).await.unwrap_err();
        assert_eq!(err.reason_code(), "not_found");
        assert_eq!(t.engine.list_chunks(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_bot_cascades() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let bot = new_bot(&t.engine, "Doomed");
        t.engine
            .ingest(bot, LoadInput::file("a.txt", "Some knowledge to remove."))
            .await
            .unwrap();
        let session = SessionId::new();
        t.engine
            .chat_in_session(bot, session, TurnInput::text("hello"))
            .await
            .unwrap();

        let deletion = t.engine.delete_bot(bot).await.unwrap();
        assert_eq!(deletion.documents_deleted, 1);
        assert_eq!(deletion.chunks_deleted, 1);
        assert!(t.engine.get_bot(bot).is_err());
        assert!(t.engine.session_history(session).await.is_err());
        assert!(t.engine.list_documents(bot).is_err());
    }

    #[tokio::test]
    async fn test_failed_chunk_delete_keeps_document_for_retry() {
        let (engine, store) = engine_with_failing_deletes(1).await;
        let bot = new_bot(&engine, "Docs");
        let doc = engine
            .ingest(bot, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();

        let err = engine.delete_document(bot, doc.document_id).await.unwrap_err();
        assert_eq!(err.reason_code(), "vector_store_unavailable");
        assert_eq!(engine.list_documents(bot).unwrap().len(), 1);
        assert_eq!(store.inner.count(bot).await.unwrap(), 1);

        let deletion = engine.delete_document(bot, doc.document_id).await.unwrap();
        assert_eq!(deletion.chunks_deleted, 1);
        assert!(engine.list_documents(bot).unwrap().is_empty());

        let overrides = RetrievalOverrides {
            min_score: Some(-1.0),
            ..Default::default()
        };
        assert!(engine.search(bot, "refund window", overrides).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_bot_purge_can_be_retried() {
        let (engine, store) = engine_with_failing_deletes(1).await;
        let bot = new_bot(&engine, "Doomed");
        engine
            .ingest(bot, LoadInput::file("a.txt", "Some knowledge to remove."))
            .await
            .unwrap();

        let err = engine.delete_bot(bot).await.unwrap_err();
        assert_eq!(err.reason_code(), "vector_store_unavailable");
        assert!(engine.get_bot(bot).is_err());
        assert_eq!(store.inner.count(bot).await.unwrap(), 1);

        let deletion = engine.delete_bot(bot).await.unwrap();
        assert_eq!(deletion.chunks_deleted, 1);
        assert_eq!(store.inner.count(bot).await.unwrap(), 0);

        let err = engine.delete_bot(bot).await.unwrap_err();
        assert_eq!(err.reason_code(), "not_found");
    }

    #[tokio::test]
    async fn test_database_refuses_other_embedder() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.embeddings.provider = EmbeddingBackend::Hash;
        config.embeddings.dimensions = 64;
        config.embeddings.seed = 0;
        config.vector_db.backend = VectorBackend::Sqlite;
        config.vector_db.storage_path = dir.path().join("knowledge.db");

        EngineComponents::from_config(&config).unwrap();
        EngineComponents::from_config(&config).unwrap();

        config.embeddings.seed = 7;
        let err = EngineComponents::from_config(&config).err().unwrap();
        assert_eq!(err.reason_code(), "config_error");
    }

    #[tokio::test]
    async fn test_session_history_is_capped() {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 256;
        config.vector_db.backend = VectorBackend::Memory;
        config.sessions.max_turns = 4;
        let components = EngineComponents {
            embedder: Arc::new(HashEmbedder::from_config(&config.embeddings)),
            llm: Arc::new(ScriptedLlm::answering("unused")),
            store: Arc::new(MemoryVectorStore::new(256)),
            catalog: Arc::new(Catalog::in_memory()),
        };
        let engine = RagEngine::with_components(config, components).await.unwrap();
        let bot = new_bot(&engine, "Chatty");
        let session = SessionId::new();

        for message in ["hello", "hi", "hey"] {
            engine
                .chat_in_session(bot, session, TurnInput::text(message))
                .await
                .unwrap();
        }

        let history = engine.session_history(session).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].text, "hi");
    }

    #[tokio::test]
    async fn test_menu_option_in_session() {
        let t = test_engine(ScriptedLlm::answering("Refunds within 30 days [Source 1].")).await;
        let bot = new_bot(&t.engine, "Acme");
        t.engine
            .ingest(bot, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();

        let option = MenuOption::new("Refunds", "Summarize the complete refund policy.");
        let session = SessionId::new();
        t.engine
            .chat_in_session(bot, session, TurnInput::from_menu_option(&option))
            .await
            .unwrap();

        let history = t.engine.session_history(session).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].text, "Refunds");
        assert_eq!(history[1].role, Role::Assistant);

        let prompts = t.llm.prompts.lock();
        assert_eq!(
            prompts[0].last_user_message(),
            Some("Summarize the complete refund policy.")
        );
    }

    #[tokio::test]
    async fn test_llm_error_gives_fallback() {
        let t = test_engine(ScriptedLlm::failing("model offline")).await;
        let bot = new_bot(&t.engine, "Acme");
        t.engine
            .ingest(bot, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();

        let reply = t
            .engine
            .chat(bot, ChatRequest::new(TurnInput::text("What is the refund window?")))
            .await
            .unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::Fallback);
        assert_eq!(reply.answer, t.engine.config().composer.fallback_answer);
    }

    #[tokio::test]
    async fn test_greeting_and_unknown_bot() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let bot = new_bot(&t.engine, "Acme Helper");

        let reply = t
            .engine
            .chat(bot, ChatRequest::new(TurnInput::text("Hello!")))
            .await
            .unwrap();
        assert_eq!(reply.outcome, ReplyOutcome::Greeting);
        assert_eq!(reply.chunks_retrieved, 0);

        let err = t
            .engine
            .chat(BotId::new(), ChatRequest::new(TurnInput::text("hi")))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "not_found");
    }

    #[tokio::test]
    async fn test_batch_results_are_per_item() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let bot = new_bot(&t.engine, "Batch");

        let results = t
            .engine
            .ingest_batch(
                bot,
                vec![
                    LoadInput::file("good.txt", "Useful knowledge for the bot."),
                    LoadInput::file("bad.bin", vec![0u8, 1, 2, 3]),
                    LoadInput::file("empty.txt", Vec::new()),
                ],
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(results[1].reason_code.as_deref(), Some("unsupported_format"));
        assert_eq!(results[2].outcome.as_ref().unwrap().status, IngestStatus::Empty);

        let stats = t.engine.knowledge_stats(bot).await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.file_documents, 1);
    }

    #[tokio::test]
    async fn test_background_ingestion_completes() {
        let t = test_engine(ScriptedLlm::answering("unused")).await;
        let bot = new_bot(&t.engine, "Async");

        let handle = t
            .engine
            .submit_ingestion(bot, LoadInput::file("faq.md", "# FAQ\n\nWe ship worldwide."))
            .await
            .unwrap();

        let mut status = JobStatus::Queued;
        for _ in 0..200 {
            status = t.engine.ingestion_status(handle.job_id).unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(status, JobStatus::Completed { chunk_count: 1 });
        let documents = t.engine.list_documents(bot).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, handle.document_id);
        assert!(!t.engine.cancel_ingestion(handle.job_id));

        let err = t
            .engine
            .submit_ingestion(BotId::new(), LoadInput::file("x.txt", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "not_found");
    }
}
