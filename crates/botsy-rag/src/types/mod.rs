//! Core types for the RAG core

pub mod bot;
pub mod chat;
pub mod document;
pub mod response;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Owning account boundary
    TenantId
);
uuid_id!(
    /// A chatbot and the scope of its knowledge base
    BotId
);
uuid_id!(DocumentId);
uuid_id!(ChunkId);
uuid_id!(
    /// Background ingestion job
    JobId
);
uuid_id!(
    /// In-process chat session
    SessionId
);

pub use bot::{Bot, BotDraft, BotUpdate, MenuOption};
pub use chat::{ChatTurn, Role, TurnInput};
pub use document::{
    Chunk, ChunkDraft, ChunkMetadata, Document, DocumentOrigin, ScoredChunk, SourceKind,
};
pub use response::{
    BotDeletion, ChatReply, ChunkSummary, CitedSource, DocumentDeletion, DocumentSummary,
    IngestItemResult, IngestOutcome, IngestStatus, KnowledgeStats, ReplyOutcome, SearchHit,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_through_string() {
        let id = BotId::new();
        let parsed: BotId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = DocumentId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }
}
