//! botsy-rag: Multi-tenant RAG core for knowledge-base chatbots
//!
//! Each bot owns an isolated knowledge base. Documents and web pages are parsed,
//! chunked and embedded into a bot-scoped vector store, and chat turns are answered
//! from retrieved context with source citations.

pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use chat::ChatRequest;
pub use config::RagConfig;
pub use engine::{EngineComponents, EngineHealth, RagEngine};
pub use error::{Error, Result};
pub use ingestion::LoadInput;
pub use retrieval::RetrievalOverrides;
pub use types::{
    Bot, BotDraft, BotId, BotUpdate, ChatReply, ChatTurn, CitedSource, DocumentId, MenuOption,
    ReplyOutcome, SessionId, TenantId, TurnInput,
};
