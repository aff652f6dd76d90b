//! API routes for the RAG server

pub mod bots;
pub mod chat;
pub mod documents;
pub mod jobs;
pub mod sessions;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Bots
        .route("/bots", post(bots::create_bot).get(bots::list_bots))
        .route(
            "/bots/:bot_id",
            get(bots::get_bot).put(bots::update_bot).delete(bots::delete_bot),
        )
        // Knowledge base - with larger body limit for file uploads
        .route(
            "/bots/:bot_id/documents",
            get(documents::list_documents)
                .post(documents::upload_documents)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/bots/:bot_id/documents/url", post(documents::ingest_url))
        .route(
            "/bots/:bot_id/documents/async",
            post(documents::ingest_async).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/bots/:bot_id/documents/:document_id",
            axum::routing::delete(documents::delete_document),
        )
        .route("/bots/:bot_id/chunks", get(documents::list_chunks))
        .route("/bots/:bot_id/stats", get(documents::knowledge_stats))
        .route("/bots/:bot_id/search", post(documents::search))
        // Chat
        .route("/bots/:bot_id/chat", post(chat::chat))
        .route(
            "/sessions/:session_id",
            get(sessions::get_history).delete(sessions::clear_session),
        )
        // Background jobs
        .route(
            "/jobs/:job_id",
            get(jobs::get_job_progress).delete(jobs::cancel_job),
        )
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    Json(serde_json::json!({
        "name": "botsy-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-tenant knowledge-base chatbots with cited answers",
        "embeddings": {
            "provider": config.embeddings.provider,
            "model": config.embeddings.model,
            "dimensions": config.embeddings.dimensions,
        },
        "llm": {
            "provider": config.llm.provider,
            "model": config.llm.model,
        },
        "vector_db": config.vector_db.backend,
        "jobs": state.engine().queue_stats(),
        "endpoints": {
            "POST /api/bots": "Create a bot",
            "GET /api/bots?tenant_id=": "List a tenant's bots",
            "GET|PUT|DELETE /api/bots/:bot_id": "Read, update or delete a bot",
            "GET /api/bots/:bot_id/documents": "List documents",
            "POST /api/bots/:bot_id/documents": "Upload files (sync, per-file results)",
            "POST /api/bots/:bot_id/documents/url": "Ingest a web page",
            "POST /api/bots/:bot_id/documents/async": "Queue files and urls for background ingestion",
            "DELETE /api/bots/:bot_id/documents/:document_id": "Delete a document and its chunks",
            "GET /api/bots/:bot_id/chunks": "List chunks",
            "GET /api/bots/:bot_id/stats": "Knowledge base totals",
            "POST /api/bots/:bot_id/search": "Raw retrieval",
            "POST /api/bots/:bot_id/chat": "Chat with citations",
            "GET|DELETE /api/sessions/:session_id": "Session history",
            "GET|DELETE /api/jobs/:job_id": "Job progress or cancellation"
        }
    }))
}
