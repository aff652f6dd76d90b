//! Session history endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{ChatTurn, SessionId};

/// GET /api/sessions/:session_id
pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Vec<ChatTurn>>> {
    Ok(Json(state.engine().session_history(session_id).await?))
}

/// DELETE /api/sessions/:session_id
pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode> {
    if state.engine().clear_session(session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("session", session_id))
    }
}
