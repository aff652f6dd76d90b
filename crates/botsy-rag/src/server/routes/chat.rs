//! Chat endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::chat::ChatRequest;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{BotId, ChatReply, ChatTurn, SessionId, TurnInput};

/// Free text in `message`, or the index of one of the bot's menu options
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub menu_option: Option<usize>,
    /// Ignored when `session_id` is given
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub reply: ChatReply,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// POST /api/bots/:bot_id/chat
pub async fn chat(
    State(state): State<AppState>,
    Path(bot_id): Path<BotId>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>> {
    let engine = state.engine();

    let input = match (body.menu_option, body.message) {
        (Some(index), _) => {
            let bot = engine.get_bot(bot_id)?;
            let option = bot
                .menu_option(index)
                .ok_or_else(|| Error::not_found("menu option", index))?;
            TurnInput::from_menu_option(option)
        }
        (None, Some(message)) if !message.trim().is_empty() => TurnInput::text(message),
        _ => {
            return Err(Error::InvalidInput(
                "either message or menu_option is required".to_string(),
            ))
        }
    };

    let reply = match body.session_id {
        Some(session_id) => engine.chat_in_session(bot_id, session_id, input).await?,
        None => {
            engine
                .chat(bot_id, ChatRequest::new(input).with_history(body.history))
                .await?
        }
    };

    Ok(Json(ChatResponse {
        reply,
        session_id: body.session_id,
    }))
}
