//! Document ingestion, listing and knowledge inspection endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ingestion::{IngestSource, LoadInput};
use crate::processing::IngestionHandle;
use crate::retrieval::RetrievalOverrides;
use crate::server::state::AppState;
use crate::types::{
    BotId, ChunkSummary, DocumentDeletion, DocumentId, DocumentSummary, IngestItemResult,
    IngestOutcome, KnowledgeStats, SearchHit,
};

#[derive(Debug, Deserialize)]
pub struct IngestUrlRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(flatten)]
    pub options: RetrievalOverrides,
}

/// Files (any field with a filename) and `url` text fields
async fn read_sources(mut multipart: Multipart) -> Result<Vec<IngestSource>> {
    let mut sources = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if let Some(filename) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::InvalidInput(format!("Failed to read {}: {}", filename, e)))?;
            tracing::info!("Received file: {} ({} bytes)", filename, bytes.len());
            sources.push(LoadInput::File {
                filename,
                content_type,
                bytes,
            });
        } else if name == "url" {
            let url = field
                .text()
                .await
                .map_err(|e| Error::InvalidInput(format!("Failed to read url field: {}", e)))?;
            if !url.trim().is_empty() {
                sources.push(LoadInput::url(url.trim()));
            }
        }
    }

    if sources.is_empty() {
        return Err(Error::InvalidInput("No files or urls provided".to_string()));
    }
    Ok(sources)
}

/// GET /api/bots/:bot_id/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
) -> Result<Json<Vec<DocumentSummary>>> {
    Ok(Json(state.engine().list_documents(bot_id)?))
}

/// POST /api/bots/:bot_id/documents - synchronous upload, one result per item
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    multipart: Multipart,
) -> Result<Json<Vec<IngestItemResult>>> {
    let sources = read_sources(multipart).await?;
    Ok(Json(state.engine().ingest_batch(bot_id, sources).await?))
}

/// POST /api/bots/:bot_id/documents/url
pub async fn ingest_url(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    Json(request): Json<IngestUrlRequest>,
) -> Result<Json<IngestOutcome>> {
    let outcome = state
        .engine()
        .ingest(bot_id, LoadInput::url(request.url))
        .await?;
    Ok(Json(outcome))
}

/// POST /api/bots/:bot_id/documents/async - queue items, return job handles
pub async fn ingest_async(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<IngestionHandle>>)> {
    let sources = read_sources(multipart).await?;

    let mut handles = Vec::with_capacity(sources.len());
    for source in sources {
        handles.push(state.engine().submit_ingestion(bot_id, source).await?);
    }
    tracing::info!("Queued {} ingestion jobs for bot {}", handles.len(), bot_id);

    Ok((StatusCode::ACCEPTED, Json(handles)))
}

/// DELETE /api/bots/:bot_id/documents/:document_id
pub async fn delete_document(
    State(state): State<AppState>,
    Path((bot_id, document_id)): Path<(BotId, DocumentId)>,
) -> Result<Json<DocumentDeletion>> {
    Ok(Json(state.engine().delete_document(bot_id, document_id).await?))
}

/// GET /api/bots/:bot_id/chunks
pub async fn list_chunks(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
) -> Result<Json<Vec<ChunkSummary>>> {
    Ok(Json(state.engine().list_chunks(bot_id).await?))
}

/// GET /api/bots/:bot_id/stats
pub async fn knowledge_stats(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
) -> Result<Json<KnowledgeStats>> {
    Ok(Json(state.engine().knowledge_stats(bot_id).await?))
}

/// POST /api/bots/:bot_id/search
pub async fn search(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>> {
    if request.query.trim().is_empty() {
        return Err(Error::InvalidInput("query must not be empty".to_string()));
    }
    let hits = state
        .engine()
        .search(bot_id, &request.query, request.options)
        .await?;
    Ok(Json(hits))
}
