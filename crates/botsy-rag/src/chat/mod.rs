//! Chat requests and session history

pub mod session;

use serde::{Deserialize, Serialize};

use crate::types::{ChatTurn, TurnInput};

pub use session::{ChatSession, SessionStore};

/// One stateless chat turn; the caller owns the history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    pub input: TurnInput,
}

impl ChatRequest {
    pub fn new(input: TurnInput) -> Self {
        Self {
            history: Vec::new(),
            input,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}
