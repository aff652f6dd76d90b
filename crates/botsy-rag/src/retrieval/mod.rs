//! Retrieval over bot-scoped knowledge

pub mod search;

pub use search::{RetrievalOptions, RetrievalOverrides, Retriever};
