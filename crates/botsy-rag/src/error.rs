//! Error types for the RAG core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::BotId;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG core errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content type we have no extractor for
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Known format, but the bytes could not be read
    #[error("Failed to parse '{source_id}': {message}")]
    ParseFailed { source_id: String, message: String },

    /// URL fetch failed (network, invalid URL or non-2xx)
    #[error("Failed to fetch '{url}': {message}")]
    FetchFailed { url: String, message: String },

    /// Embedding provider failed
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Vector store could not serve the request
    #[error("Vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    /// Language model call failed
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// A bounded operation ran past its deadline
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Bot, document, job or session missing
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A bot-scoped operation saw data owned by another bot
    #[error("Tenant isolation violation: expected bot {expected}, found {found}")]
    TenantIsolationViolation { expected: BotId, found: BotId },

    /// Caller supplied an invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse error
    pub fn parse_failed(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailed {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Create a fetch error
    pub fn fetch_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingFailed(message.into())
    }

    /// Create a vector store error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::VectorStoreUnavailable(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }

    /// Create a not-found error
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable reason code reported to callers
    pub fn reason_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::ParseFailed { .. } => "parse_failed",
            Error::FetchFailed { .. } => "fetch_failed",
            Error::EmbeddingFailed(_) => "embedding_failed",
            Error::VectorStoreUnavailable(_) => "vector_store_unavailable",
            Error::GenerationFailed(_) => "generation_failed",
            Error::Timeout { .. } => "timeout",
            Error::NotFound { .. } => "not_found",
            Error::TenantIsolationViolation { .. } => "tenant_isolation_violation",
            Error::InvalidInput(_) => "invalid_input",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether a bounded retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::VectorStoreUnavailable(_) | Error::Timeout { .. }
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::ParseFailed { .. } | Error::InvalidInput(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::EmbeddingFailed(_)
            | Error::VectorStoreUnavailable(_)
            | Error::GenerationFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::TenantIsolationViolation { .. } | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::VectorStoreUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::TenantIsolationViolation { expected, found } = &self {
            tracing::error!(%expected, %found, "tenant isolation violation reached the HTTP boundary");
        }

        let status = self.status();
        let body = Json(json!({
            "error": {
                "type": self.reason_code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
