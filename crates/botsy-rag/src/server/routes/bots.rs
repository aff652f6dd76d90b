//! Bot management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{Bot, BotDeletion, BotDraft, BotId, BotUpdate, TenantId};

#[derive(Debug, Deserialize)]
pub struct CreateBotRequest {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub draft: BotDraft,
}

#[derive(Debug, Deserialize)]
pub struct ListBotsQuery {
    pub tenant_id: TenantId,
}

/// POST /api/bots
pub async fn create_bot(
    State(state): State<AppState>,
    Json(request): Json<CreateBotRequest>,
) -> Result<(StatusCode, Json<Bot>)> {
    let bot = state.engine().create_bot(request.tenant_id, request.draft)?;
    Ok((StatusCode::CREATED, Json(bot)))
}

/// GET /api/bots?tenant_id=
pub async fn list_bots(
    State(state): State<AppState>,
    Query(query): Query<ListBotsQuery>,
) -> Json<Vec<Bot>> {
    Json(state.engine().list_bots(query.tenant_id))
}

/// GET /api/bots/:bot_id
pub async fn get_bot(State(state): State<AppState>, Path(bot_id): Path<BotId>) -> Result<Json<Bot>> {
    Ok(Json(state.engine().get_bot(bot_id)?))
}

/// PUT /api/bots/:bot_id
pub async fn update_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    Json(update): Json<BotUpdate>,
) -> Result<Json<Bot>> {
    Ok(Json(state.engine().update_bot(bot_id, update)?))
}

/// DELETE /api/bots/:bot_id
pub async fn delete_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
) -> Result<Json<BotDeletion>> {
    Ok(Json(state.engine().delete_bot(bot_id).await?))
}
