//! Provider abstractions for embeddings, LLM and vector storage
//!
//! Trait-based seams so local and remote backends can be swapped by config.

pub mod embedding;
pub mod hash_embedder;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod vector_store;

pub use embedding::EmbeddingProvider;
pub use hash_embedder::HashEmbedder;
pub use llm::{ChatPrompt, LlmProvider, PromptMessage, PromptRole};
pub use ollama::{OllamaEmbedder, OllamaLlm};
pub use openai::OpenAiCompatibleLlm;
pub use vector_store::VectorStore;
