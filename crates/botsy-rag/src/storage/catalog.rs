//! Bot and document registry
//!
//! Records live in `DashMap`s; when a `KnowledgeDb` is attached every change
//! is written through before the maps are updated.

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::types::{Bot, BotDraft, BotId, BotUpdate, Document, DocumentId, TenantId};

use super::database::KnowledgeDb;

pub struct Catalog {
    bots: DashMap<BotId, Bot>,
    documents: DashMap<DocumentId, Document>,
    database: Option<KnowledgeDb>,
}

impl Catalog {
    /// Catalog without persistence
    pub fn in_memory() -> Self {
        Self {
            bots: DashMap::new(),
            documents: DashMap::new(),
            database: None,
        }
    }

    /// Catalog backed by the database, preloaded with its records
    pub fn with_database(database: KnowledgeDb) -> Result<Self> {
        let bots = DashMap::new();
        for bot in database.load_bots()? {
            bots.insert(bot.id, bot);
        }

        let documents = DashMap::new();
        for document in database.load_documents()? {
            documents.insert(document.id, document);
        }

        tracing::info!(
            "Loaded {} bots and {} documents from database",
            bots.len(),
            documents.len()
        );

        Ok(Self {
            bots,
            documents,
            database: Some(database),
        })
    }

    // ==================== Bots ====================

    pub fn create_bot(&self, tenant_id: TenantId, draft: BotDraft) -> Result<Bot> {
        if draft.name.trim().is_empty() {
            return Err(Error::InvalidInput("bot name must not be empty".into()));
        }

        let bot = Bot::from_draft(tenant_id, draft);
        if let Some(db) = &self.database {
            db.upsert_bot(&bot)?;
        }
        self.bots.insert(bot.id, bot.clone());
        Ok(bot)
    }

    pub fn bot(&self, bot_id: BotId) -> Result<Bot> {
        self.bots
            .get(&bot_id)
            .map(|b| b.value().clone())
            .ok_or_else(|| Error::not_found("bot", bot_id))
    }

    pub fn contains_bot(&self, bot_id: BotId) -> bool {
        self.bots.contains_key(&bot_id)
    }

    pub fn update_bot(&self, bot_id: BotId, update: BotUpdate) -> Result<Bot> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::InvalidInput("bot name must not be empty".into()));
        }

        let mut bot = self.bot(bot_id)?;
        bot.apply(update);
        if let Some(db) = &self.database {
            db.upsert_bot(&bot)?;
        }
        self.bots.insert(bot.id, bot.clone());
        Ok(bot)
    }

    /// Bots owned by a tenant, oldest first
    pub fn bots_for_tenant(&self, tenant_id: TenantId) -> Vec<Bot> {
        let mut bots: Vec<Bot> = self
            .bots
            .iter()
            .filter(|b| b.tenant_id == tenant_id)
            .map(|b| b.value().clone())
            .collect();
        bots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        bots
    }

    /// Remove a bot and its document records, returning the removed documents
    pub fn remove_bot(&self, bot_id: BotId) -> Result<Vec<Document>> {
        if !self.contains_bot(bot_id) {
            return Err(Error::not_found("bot", bot_id));
        }
        if let Some(db) = &self.database {
            db.delete_bot_records(bot_id)?;
        }

        self.bots.remove(&bot_id);
        let ids: Vec<DocumentId> = self
            .documents
            .iter()
            .filter(|d| d.bot_id == bot_id)
            .map(|d| d.id)
            .collect();

        Ok(ids
            .into_iter()
            .filter_map(|id| self.documents.remove(&id).map(|(_, d)| d))
            .collect())
    }

    // ==================== Documents ====================

    /// Register a document whose chunks are already stored
    pub fn register_document(&self, document: Document) -> Result<()> {
        if !self.contains_bot(document.bot_id) {
            return Err(Error::not_found("bot", document.bot_id));
        }
        if let Some(db) = &self.database {
            db.insert_document(&document)?;
        }
        self.documents.insert(document.id, document);
        Ok(())
    }

    /// Document lookup scoped to its bot; another bot's document is not found
    pub fn document(&self, bot_id: BotId, document_id: DocumentId) -> Result<Document> {
        self.documents
            .get(&document_id)
            .filter(|d| d.bot_id == bot_id)
            .map(|d| d.value().clone())
            .ok_or_else(|| Error::not_found("document", document_id))
    }

    /// Documents of a bot, oldest first
    pub fn documents_for_bot(&self, bot_id: BotId) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| d.bot_id == bot_id)
            .map(|d| d.value().clone())
            .collect();
        documents.sort_by(|a, b| a.ingested_at.cmp(&b.ingested_at).then(a.id.cmp(&b.id)));
        documents
    }

    pub fn remove_document(&self, bot_id: BotId, document_id: DocumentId) -> Result<Document> {
        let document = self.document(bot_id, document_id)?;
        if let Some(db) = &self.database {
            db.delete_document_record(bot_id, document_id)?;
        }
        self.documents.remove(&document_id);
        Ok(document)
    }
}
