//! Configuration for the RAG core

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "BOTSY_CONFIG";

/// Upper bound for `retrieval.max_retries`
pub const MAX_SEARCH_RETRIES: u32 = 10;

/// Main RAG configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Loader configuration
    pub ingestion: IngestionConfig,
    /// Language model configuration
    pub llm: LlmConfig,
    /// Vector store configuration
    pub vector_db: VectorDbConfig,
    /// Retrieval defaults
    pub retrieval: RetrievalConfig,
    /// Answer composition
    pub composer: ComposerConfig,
    /// Background processing
    pub processing: ProcessingConfig,
    /// Server-held chat sessions
    pub sessions: SessionConfig,
}

impl RagConfig {
    /// Read a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: RagConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `BOTSY_CONFIG` (or defaults) and apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("BOTSY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BOTSY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("BOTSY_PORT: {}", e)))?;
        }
        if let Ok(url) = std::env::var("BOTSY_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("BOTSY_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(key) = std::env::var("BOTSY_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        Ok(())
    }

    /// Reject settings that cannot work together
    pub fn validate(&self) -> Result<()> {
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".into()));
        }
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be > 0".into()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(Error::Config("retrieval.min_score must be within [-1, 1]".into()));
        }
        if self.composer.max_citations == 0 {
            return Err(Error::Config("composer.max_citations must be > 0".into()));
        }
        if self.embeddings.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(Error::Config("timeouts must be > 0".into()));
        }
        if self.retrieval.max_retries > MAX_SEARCH_RETRIES {
            return Err(Error::Config(format!(
                "retrieval.max_retries must be at most {}",
                MAX_SEARCH_RETRIES
            )));
        }
        if self.sessions.max_sessions == 0 || self.sessions.max_turns < 2 {
            return Err(Error::Config(
                "sessions.max_sessions must be > 0 and sessions.max_turns at least 2".into(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// Embedding backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature-hashing embedder
    #[default]
    Hash,
    /// Ollama embeddings API
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    /// Model name (Ollama backend)
    pub model: String,
    /// Embedding dimensions, fixed per deployment
    pub dimensions: usize,
    /// Seed mixed into hashed features
    pub seed: u64,
    /// Texts per embed_batch call from the pipeline
    pub batch_size: usize,
    /// Per-call timeout
    pub timeout_secs: u64,
    /// Ollama base URL
    pub base_url: String,
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Hash,
            model: "all-minilm".to_string(),
            dimensions: 384,
            seed: 0,
            batch_size: 32,
            timeout_secs: 30,
            base_url: "http://localhost:11434".to_string(),
            max_retries: 2,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// Texts shorter than this yield no chunks
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 10,
        }
    }
}

/// Markdown handling policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarkdownPolicy {
    /// Leave markup intact
    #[default]
    Keep,
    /// Reduce to plain text
    Strip,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub markdown: MarkdownPolicy,
    /// URL fetch timeout
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    /// Largest page body accepted from a URL
    pub max_page_bytes: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            markdown: MarkdownPolicy::Keep,
            fetch_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (compatible; BotsyRAG/0.1)"
                .to_string(),
            max_page_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Language model backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Ollama chat API
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat completions API (OpenAI, Groq, ...)
    OpenAi,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmBackend,
    pub base_url: String,
    /// Bearer key for OpenAI-compatible APIs
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call timeout
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            model: "llama3.2:3b".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 60,
            max_retries: 1,
        }
    }
}

/// Vector store backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Process-local sharded maps
    Memory,
    /// SQLite file
    #[default]
    Sqlite,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    pub backend: VectorBackend,
    /// SQLite database path
    pub storage_path: PathBuf,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("botsy-rag")
            .join("knowledge.db");

        Self {
            backend: VectorBackend::Sqlite,
            storage_path,
        }
    }
}

/// Retrieval defaults; callers may override per request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Relevance floor
    pub min_score: f32,
    /// Keep only the best chunk per document
    pub diversify: bool,
    /// Search multiplier applied when diversifying
    pub oversample: usize,
    /// Retries on vector store unavailability
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.1,
            diversify: false,
            oversample: 3,
            max_retries: 2,
            retry_backoff_ms: 100,
        }
    }
}

/// Which chunks become citations
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CitationPolicy {
    /// Sources the answer references, else everything in context
    #[default]
    Referenced,
    /// Everything passed into context
    AllContext,
}

/// Answer composition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Prior turns included in the prompt
    pub history_window: usize,
    /// Character budget for the context block
    pub max_context_chars: usize,
    pub max_citations: usize,
    pub snippet_chars: usize,
    pub citation_policy: CitationPolicy,
    /// Answer short greetings without retrieval
    pub greeting_shortcut: bool,
    /// Persona used when a bot has none
    pub default_system_prompt: String,
    pub no_context_answer: String,
    pub fallback_answer: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_context_chars: 8000,
            max_citations: 3,
            snippet_chars: 200,
            citation_policy: CitationPolicy::Referenced,
            greeting_shortcut: true,
            default_system_prompt: "You are a helpful assistant that answers questions using the provided knowledge base.".to_string(),
            no_context_answer: "I don't have information about that in my knowledge base. Please ask questions related to the documents I've been trained on.".to_string(),
            fallback_answer: "I apologize, but I encountered an error while processing your request. Please try again.".to_string(),
        }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Documents ingested concurrently (default: CPU count, max 4)
    pub parallel_documents: Option<usize>,
    /// Whole-document deadline in seconds
    pub document_timeout_secs: u64,
    /// Pending job capacity
    pub queue_capacity: usize,
    /// Finished jobs stay queryable this long
    pub job_retention_secs: u64,
    /// Finished jobs kept at most, newest first
    pub max_finished_jobs: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_documents: None,
            document_timeout_secs: 300,
            queue_capacity: 1000,
            job_retention_secs: 3600,
            max_finished_jobs: 1000,
        }
    }
}

impl ProcessingConfig {
    pub fn workers(&self) -> usize {
        self.parallel_documents
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}

/// Limits for sessions held by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions untouched this long are dropped
    pub idle_ttl_secs: u64,
    /// Open sessions at most; the least recently used goes first
    pub max_sessions: usize,
    /// Turns kept per session, oldest dropped first
    pub max_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 30 * 60,
            max_sessions: 10_000,
            max_turns: 200,
        }
    }
}
