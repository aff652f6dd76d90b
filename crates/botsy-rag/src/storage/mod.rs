//! Storage for bots, documents and chunk vectors
//!
//! Provides an in-memory store and SQLite persistence.

pub mod catalog;
pub mod database;
pub mod memory;

pub use catalog::Catalog;
pub use database::KnowledgeDb;
pub use memory::MemoryVectorStore;
