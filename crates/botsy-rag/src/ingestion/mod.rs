//! Document ingestion: loading, parsing, chunking and the write pipeline

pub mod chunker;
pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod web;

pub use chunker::TextChunker;
pub use loader::{DocumentLoader, LoadInput, NormalizedText, SourceMetadata, TextSection};
pub use pipeline::{IngestPipeline, IngestStage};

/// A source submitted for ingestion
pub type IngestSource = LoadInput;
