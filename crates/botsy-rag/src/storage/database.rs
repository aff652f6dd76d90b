//! SQLite database for bots, documents and chunk vectors
//!
//! Every table carries `bot_id`; chunk queries are always filtered on it.
//! Writes go through a single connection. File databases run in WAL mode and
//! serve reads from separate read-only connections, so a long write for one
//! bot never stalls searches of another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, types::Type, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::embedding::{bytes_to_embedding, cosine_similarity, embedding_to_bytes};
use crate::providers::vector_store::{
    check_dimensions, check_results_scope, check_write_scope, rank_and_truncate, VectorStore,
};
use crate::types::{
    Bot, BotId, Chunk, ChunkMetadata, Document, DocumentId, DocumentOrigin, ScoredChunk,
    SourceKind,
};

const CHUNK_COLUMNS: &str = "id, document_id, bot_id, sequence, text, embedding, \
                             source_kind, origin, source_id, title, page";

const META_EMBEDDING_MODEL: &str = "embedding_model";
const META_EMBEDDING_DIMENSIONS: &str = "embedding_dimensions";

const MAX_IDLE_READERS: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only connections over the database file
struct ReaderPool {
    /// `None` for in-memory databases, which read through the writer
    path: Option<PathBuf>,
    idle: Mutex<Vec<Connection>>,
}

/// SQLite-backed knowledge store
#[derive(Clone)]
pub struct KnowledgeDb {
    writer: Arc<Mutex<Connection>>,
    readers: Arc<ReaderPool>,
    dimensions: usize,
}

impl KnowledgeDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let db = Self {
            writer: Arc::new(Mutex::new(conn)),
            readers: Arc::new(ReaderPool {
                path: Some(path.to_path_buf()),
                idle: Mutex::new(Vec::new()),
            }),
            dimensions,
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            writer: Arc::new(Mutex::new(conn)),
            readers: Arc::new(ReaderPool {
                path: None,
                idle: Mutex::new(Vec::new()),
            }),
            dimensions,
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run a query on a read connection, returning it to the pool afterwards
    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let Some(path) = &self.readers.path else {
            let conn = self.writer.lock();
            return f(&conn);
        };

        let pooled = self.readers.idle.lock().pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|e| Error::Internal(format!("Failed to open read connection: {}", e)))?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                conn
            }
        };

        let result = f(&conn);

        let mut idle = self.readers.idle.lock();
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
        result
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.writer.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                system_prompt TEXT,
                greeting_message TEXT,
                avatar TEXT,
                menu_options TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bots_tenant_id ON bots(tenant_id);

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                origin TEXT NOT NULL,
                source_id TEXT NOT NULL,
                title TEXT,
                content_type TEXT NOT NULL,
                byte_size INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_bot_id ON documents(bot_id);

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                bot_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                source_kind TEXT NOT NULL,
                origin TEXT NOT NULL,
                source_id TEXT NOT NULL,
                title TEXT,
                page INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_bot_id ON chunks(bot_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_bot_document ON chunks(bot_id, document_id);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    // ==================== Embedding Space ====================

    /// Record the embedding model on first use and refuse any other later.
    ///
    /// Vectors from different models (or seeds) are not comparable, so a
    /// database stays bound to the model that filled it.
    pub fn bind_embedding_model(&self, model_id: &str) -> Result<()> {
        let conn = self.writer.lock();
        let read_meta = |key: &str| -> rusqlite::Result<Option<String>> {
            conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        };

        let dimensions = self.dimensions.to_string();
        let stored_model = read_meta(META_EMBEDDING_MODEL)?;
        let stored_dimensions = read_meta(META_EMBEDDING_DIMENSIONS)?;

        match (stored_model, stored_dimensions) {
            (None, None) => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2), (?3, ?4)",
                    params![
                        META_EMBEDDING_MODEL,
                        model_id,
                        META_EMBEDDING_DIMENSIONS,
                        dimensions
                    ],
                )?;
                tracing::info!("Knowledge database bound to {} ({} dimensions)", model_id, dimensions);
                Ok(())
            }
            (Some(model), Some(dims)) if model == model_id && dims == dimensions => Ok(()),
            (model, dims) => Err(Error::Config(format!(
                "knowledge database holds vectors from {} ({} dimensions) but the configured \
                 embedder is {} ({} dimensions); use a new storage_path or restore the \
                 original embedding settings",
                model.as_deref().unwrap_or("an unknown model"),
                dims.as_deref().unwrap_or("?"),
                model_id,
                dimensions
            ))),
        }
    }

    /// Delete chunks whose bot record no longer exists
    pub fn purge_orphaned_chunks(&self) -> Result<usize> {
        let conn = self.writer.lock();
        let count = conn.execute(
            "DELETE FROM chunks WHERE bot_id NOT IN (SELECT id FROM bots)",
            [],
        )?;
        Ok(count)
    }

    // ==================== Bot Operations ====================

    /// Insert or replace a bot record
    pub fn upsert_bot(&self, bot: &Bot) -> Result<()> {
        let menu_options = serde_json::to_string(&bot.menu_options)?;
        let conn = self.writer.lock();

        conn.execute(
            r#"
            INSERT INTO bots (
                id, tenant_id, name, description, system_prompt, greeting_message,
                avatar, menu_options, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                system_prompt = excluded.system_prompt,
                greeting_message = excluded.greeting_message,
                avatar = excluded.avatar,
                menu_options = excluded.menu_options,
                updated_at = excluded.updated_at
            "#,
            params![
                bot.id.to_string(),
                bot.tenant_id.to_string(),
                bot.name,
                bot.description,
                bot.system_prompt,
                bot.greeting_message,
                bot.avatar,
                menu_options,
                bot.created_at.to_rfc3339(),
                bot.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Load every bot
    pub fn load_bots(&self) -> Result<Vec<Bot>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, name, description, system_prompt, greeting_message, \
                 avatar, menu_options, created_at, updated_at FROM bots ORDER BY created_at",
            )?;

            let bots = stmt
                .query_map([], row_to_bot)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(bots)
        })
    }

    /// Remove a bot record and its document records
    pub fn delete_bot_records(&self, bot_id: BotId) -> Result<bool> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM documents WHERE bot_id = ?1",
            params![bot_id.to_string()],
        )?;
        let count = tx.execute("DELETE FROM bots WHERE id = ?1", params![bot_id.to_string()])?;
        tx.commit()?;
        Ok(count > 0)
    }

    // ==================== Document Operations ====================

    pub fn insert_document(&self, document: &Document) -> Result<()> {
        let conn = self.writer.lock();

        conn.execute(
            r#"
            INSERT INTO documents (
                id, bot_id, origin, source_id, title, content_type,
                byte_size, content_hash, chunk_count, ingested_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                document.id.to_string(),
                document.bot_id.to_string(),
                document.origin.as_str(),
                document.source_id,
                document.title,
                document.content_type,
                document.byte_size as i64,
                document.content_hash,
                document.chunk_count as i64,
                document.ingested_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Load every document record
    pub fn load_documents(&self) -> Result<Vec<Document>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, bot_id, origin, source_id, title, content_type, byte_size, \
                 content_hash, chunk_count, ingested_at FROM documents ORDER BY ingested_at",
            )?;

            let documents = stmt
                .query_map([], row_to_document)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(documents)
        })
    }

    pub fn delete_document_record(&self, bot_id: BotId, document_id: DocumentId) -> Result<bool> {
        let conn = self.writer.lock();
        let count = conn.execute(
            "DELETE FROM documents WHERE bot_id = ?1 AND id = ?2",
            params![bot_id.to_string(), document_id.to_string()],
        )?;
        Ok(count > 0)
    }

    // ==================== Chunk Operations (blocking) ====================

    fn insert_chunks_blocking(&self, chunks: &[Chunk]) -> Result<()> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        write_chunks(&tx, chunks)?;
        tx.commit()?;
        Ok(())
    }

    fn query_chunks_blocking(&self, bot_id: BotId) -> Result<Vec<Chunk>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chunks WHERE bot_id = ?1 ORDER BY document_id, sequence",
                CHUNK_COLUMNS
            ))?;

            let chunks = stmt
                .query_map(params![bot_id.to_string()], row_to_chunk)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(chunks)
        })
    }

    fn delete_chunks_blocking(&self, bot_id: BotId, document_id: Option<DocumentId>) -> Result<usize> {
        let conn = self.writer.lock();
        let count = match document_id {
            Some(document_id) => conn.execute(
                "DELETE FROM chunks WHERE bot_id = ?1 AND document_id = ?2",
                params![bot_id.to_string(), document_id.to_string()],
            )?,
            None => conn.execute(
                "DELETE FROM chunks WHERE bot_id = ?1",
                params![bot_id.to_string()],
            )?,
        };
        Ok(count)
    }

    fn count_chunks_blocking(&self, bot_id: BotId) -> Result<usize> {
        let count: i64 = self.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE bot_id = ?1",
                params![bot_id.to_string()],
                |row| row.get(0),
            )?)
        })?;
        Ok(count as usize)
    }

    /// Run a blocking closure against a clone of this handle
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(KnowledgeDb) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(db)).await?
    }
}

#[async_trait]
impl VectorStore for KnowledgeDb {
    async fn upsert(&self, bot_id: BotId, chunk: Chunk) -> Result<()> {
        self.upsert_batch(bot_id, vec![chunk]).await
    }

    async fn upsert_batch(&self, bot_id: BotId, chunks: Vec<Chunk>) -> Result<()> {
        for chunk in &chunks {
            check_write_scope(bot_id, chunk)?;
            check_dimensions(self.dimensions, chunk)?;
        }
        if chunks.is_empty() {
            return Ok(());
        }
        self.blocking(move |db| db.insert_chunks_blocking(&chunks)).await
    }

    async fn delete_document(&self, bot_id: BotId, document_id: DocumentId) -> Result<usize> {
        self.blocking(move |db| db.delete_chunks_blocking(bot_id, Some(document_id)))
            .await
    }

    async fn delete_bot(&self, bot_id: BotId) -> Result<usize> {
        self.blocking(move |db| db.delete_chunks_blocking(bot_id, None))
            .await
    }

    async fn search(
        &self,
        bot_id: BotId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query = query.to_vec();
        let results = self
            .blocking(move |db| {
                let scored = db
                    .query_chunks_blocking(bot_id)?
                    .into_iter()
                    .map(|chunk| ScoredChunk {
                        score: cosine_similarity(&query, &chunk.embedding),
                        chunk,
                    })
                    .collect();
                Ok(rank_and_truncate(scored, top_k))
            })
            .await?;

        check_results_scope(bot_id, &results)?;
        Ok(results)
    }

    async fn list_chunks(&self, bot_id: BotId) -> Result<Vec<Chunk>> {
        self.blocking(move |db| db.query_chunks_blocking(bot_id)).await
    }

    async fn count(&self, bot_id: BotId) -> Result<usize> {
        self.blocking(move |db| db.count_chunks_blocking(bot_id)).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.blocking(|db| {
            db.read(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))? == 1))
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn write_chunks(conn: &Connection, chunks: &[Chunk]) -> Result<()> {
    let mut stmt = conn.prepare(&format!(
        "INSERT OR REPLACE INTO chunks ({}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        CHUNK_COLUMNS
    ))?;
    for chunk in chunks {
        stmt.execute(params![
            chunk.id.to_string(),
            chunk.document_id.to_string(),
            chunk.bot_id.to_string(),
            chunk.sequence as i64,
            chunk.text,
            embedding_to_bytes(&chunk.embedding),
            chunk.metadata.source_kind.as_str(),
            chunk.metadata.origin.as_str(),
            chunk.metadata.source_id,
            chunk.metadata.title,
            chunk.metadata.page.map(i64::from),
        ])?;
    }
    Ok(())
}

// ==================== Row Mapping ====================

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_bot(row: &Row<'_>) -> rusqlite::Result<Bot> {
    let menu_options: String = row.get(7)?;
    Ok(Bot {
        id: parse_column(row, 0)?,
        tenant_id: parse_column(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        system_prompt: row.get(4)?,
        greeting_message: row.get(5)?,
        avatar: row.get(6)?,
        menu_options: serde_json::from_str(&menu_options)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        created_at: parse_timestamp(row, 8)?,
        updated_at: parse_timestamp(row, 9)?,
    })
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let origin: String = row.get(2)?;
    let byte_size: i64 = row.get(6)?;
    let chunk_count: i64 = row.get(8)?;
    Ok(Document {
        id: parse_column(row, 0)?,
        bot_id: parse_column(row, 1)?,
        origin: DocumentOrigin::parse(&origin),
        source_id: row.get(3)?,
        title: row.get(4)?,
        content_type: row.get(5)?,
        byte_size: byte_size as u64,
        content_hash: row.get(7)?,
        chunk_count: chunk_count as usize,
        ingested_at: parse_timestamp(row, 9)?,
    })
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let sequence: i64 = row.get(3)?;
    let embedding: Vec<u8> = row.get(5)?;
    let source_kind: String = row.get(6)?;
    let origin: String = row.get(7)?;
    let page: Option<i64> = row.get(10)?;
    Ok(Chunk {
        id: parse_column(row, 0)?,
        document_id: parse_column(row, 1)?,
        bot_id: parse_column(row, 2)?,
        sequence: sequence as u32,
        text: row.get(4)?,
        embedding: bytes_to_embedding(&embedding),
        metadata: ChunkMetadata {
            source_kind: SourceKind::parse(&source_kind),
            origin: DocumentOrigin::parse(&origin),
            source_id: row.get(8)?,
            title: row.get(9)?,
            page: page.map(|p| p as u32),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbedder;
    use crate::storage::memory::tests::make_chunk;
    use crate::types::{BotDraft, MenuOption, TenantId};

    fn document(bot_id: BotId, chunk_count: usize) -> Document {
        Document {
            id: DocumentId::new(),
            bot_id,
            origin: DocumentOrigin::Url,
            source_id: "https://example.com/faq".into(),
            title: Some("FAQ".into()),
            content_type: "text/html".into(),
            byte_size: 1024,
            content_hash: "abc".into(),
            chunk_count,
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_chunks_round_trip_with_vectors() {
        let embedder = HashEmbedder::new(32, 0);
        let db = KnowledgeDb::in_memory(32).unwrap();
        let bot = BotId::new();
        let doc = DocumentId::new();

        let mut chunk = make_chunk(&embedder, bot, doc, 0, "Our refund window is 30 days.");
        chunk.metadata.page = Some(3);
        db.upsert(bot, chunk.clone()).await.unwrap();

        let stored = db.list_chunks(bot).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, chunk.id);
        assert_eq!(stored[0].embedding, chunk.embedding);
        assert_eq!(stored[0].metadata, chunk.metadata);

        let hits = db.search(bot, &chunk.embedding, 3).await.unwrap();
        assert_eq!(hits[0].chunk.id, chunk.id);
    }

    #[tokio::test]
    async fn test_search_scoped_to_bot() {
        let embedder = HashEmbedder::new(32, 0);
        let db = KnowledgeDb::in_memory(32).unwrap();
        let (bot_a, bot_b) = (BotId::new(), BotId::new());

        db.upsert(bot_a, make_chunk(&embedder, bot_a, DocumentId::new(), 0, "shared words"))
            .await
            .unwrap();
        db.upsert(bot_b, make_chunk(&embedder, bot_b, DocumentId::new(), 0, "shared words"))
            .await
            .unwrap();

        let hits = db.search(bot_a, &embedder.embed_sync("shared words"), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.bot_id, bot_a);
        assert_eq!(db.count(bot_b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let embedder = HashEmbedder::new(32, 0);
        let db = KnowledgeDb::in_memory(32).unwrap();
        let bot = BotId::new();
        let doc = DocumentId::new();

        let foreign = make_chunk(&embedder, BotId::new(), doc, 1, "foreign");
        let batch = vec![make_chunk(&embedder, bot, doc, 0, "mine"), foreign];

        assert!(db.upsert_batch(bot, batch).await.is_err());
        assert_eq!(db.count(bot).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_document_chunks() {
        let embedder = HashEmbedder::new(32, 0);
        let db = KnowledgeDb::in_memory(32).unwrap();
        let bot = BotId::new();
        let (doc_a, doc_b) = (DocumentId::new(), DocumentId::new());

        db.upsert_batch(
            bot,
            vec![
                make_chunk(&embedder, bot, doc_a, 0, "a0"),
                make_chunk(&embedder, bot, doc_a, 1, "a1"),
                make_chunk(&embedder, bot, doc_b, 0, "b0"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(db.delete_document(bot, doc_a).await.unwrap(), 2);
        assert_eq!(db.count(bot).await.unwrap(), 1);
        assert_eq!(db.delete_bot(bot).await.unwrap(), 1);
    }

    #[test]
    fn test_bot_and_document_records() {
        let db = KnowledgeDb::in_memory(8).unwrap();
        let mut bot = Bot::from_draft(
            TenantId::new(),
            BotDraft {
                name: "Support".into(),
                menu_options: vec![MenuOption::new("Pricing", "Explain pricing tiers")],
                ..Default::default()
            },
        );
        db.upsert_bot(&bot).unwrap();

        bot.name = "Support v2".into();
        db.upsert_bot(&bot).unwrap();

        let bots = db.load_bots().unwrap();
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].name, "Support v2");
        assert_eq!(bots[0].menu_options[0].prompt, "Explain pricing tiers");

        let doc = document(bot.id, 4);
        db.insert_document(&doc).unwrap();
        let docs = db.load_documents().unwrap();
        assert_eq!(docs[0].id, doc.id);
        assert_eq!(docs[0].origin, DocumentOrigin::Url);
        assert_eq!(docs[0].chunk_count, 4);

        assert!(!db.delete_document_record(BotId::new(), doc.id).unwrap());
        assert!(db.delete_bot_records(bot.id).unwrap());
        assert!(db.load_documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("knowledge.db");
        let embedder = HashEmbedder::new(16, 0);
        let bot = BotId::new();

        {
            let db = KnowledgeDb::new(&path, 16).unwrap();
            db.upsert(bot, make_chunk(&embedder, bot, DocumentId::new(), 0, "persisted"))
                .await
                .unwrap();
        }

        let db = KnowledgeDb::new(&path, 16).unwrap();
        assert_eq!(db.count(bot).await.unwrap(), 1);
        assert!(db.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_search_not_blocked_by_open_write() {
        let dir = tempfile::tempdir().unwrap();
        let db = KnowledgeDb::new(dir.path().join("knowledge.db"), 32).unwrap();
        let embedder = HashEmbedder::new(32, 0);
        let (bot_a, bot_b) = (BotId::new(), BotId::new());

        db.upsert(bot_b, make_chunk(&embedder, bot_b, DocumentId::new(), 0, "shipping times"))
            .await
            .unwrap();

        // A long write for bot A holds the writer inside an open transaction
        let mut writer = db.writer.lock();
        let tx = writer.transaction().unwrap();
        write_chunks(
            &tx,
            &[make_chunk(&embedder, bot_a, DocumentId::new(), 0, "refund window")],
        )
        .unwrap();

        let hits = tokio::time::timeout(
            Duration::from_secs(5),
            db.search(bot_b, &embedder.embed_sync("shipping times"), 5),
        )
        .await
        .expect("search waited on another bot's write")
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.bot_id, bot_b);

        let uncommitted = tokio::time::timeout(Duration::from_secs(5), db.count(bot_a))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(uncommitted, 0);

        tx.commit().unwrap();
        drop(writer);
        assert_eq!(db.count(bot_a).await.unwrap(), 1);
    }

    #[test]
    fn test_embedding_model_is_bound_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.db");

        {
            let db = KnowledgeDb::new(&path, 16).unwrap();
            db.bind_embedding_model("hash-16d-seed0").unwrap();
            db.bind_embedding_model("hash-16d-seed0").unwrap();
        }

        let db = KnowledgeDb::new(&path, 16).unwrap();
        db.bind_embedding_model("hash-16d-seed0").unwrap();
        let err = db.bind_embedding_model("hash-16d-seed7").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let wider = KnowledgeDb::new(&path, 32).unwrap();
        assert!(wider.bind_embedding_model("hash-16d-seed0").is_err());
    }

    #[tokio::test]
    async fn test_purge_orphaned_chunks() {
        let embedder = HashEmbedder::new(16, 0);
        let db = KnowledgeDb::in_memory(16).unwrap();
        let bot = Bot::from_draft(TenantId::new(), BotDraft::named("Kept"));
        db.upsert_bot(&bot).unwrap();
        let orphan = BotId::new();

        db.upsert(bot.id, make_chunk(&embedder, bot.id, DocumentId::new(), 0, "kept"))
            .await
            .unwrap();
        db.upsert(orphan, make_chunk(&embedder, orphan, DocumentId::new(), 0, "left over"))
            .await
            .unwrap();

        assert_eq!(db.purge_orphaned_chunks().unwrap(), 1);
        assert_eq!(db.count(bot.id).await.unwrap(), 1);
        assert_eq!(db.count(orphan).await.unwrap(), 0);
    }
}
