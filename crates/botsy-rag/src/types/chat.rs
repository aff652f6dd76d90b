//! Chat turns and turn input

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bot::MenuOption;
use super::response::CitedSource;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cited_sources: Vec<CitedSource>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            cited_sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>, cited_sources: Vec<CitedSource>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            cited_sources,
            timestamp: Utc::now(),
        }
    }
}

/// What the end user saw versus what the model receives.
///
/// Free text carries the same string in both fields. A menu option shows
/// its label in history and sends its hidden prompt to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInput {
    pub visible_text: String,
    pub effective_prompt: String,
}

impl TurnInput {
    pub fn text(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            visible_text: message.clone(),
            effective_prompt: message,
        }
    }

    pub fn from_menu_option(option: &MenuOption) -> Self {
        Self {
            visible_text: option.label.clone(),
            effective_prompt: option.prompt.clone(),
        }
    }

    pub fn is_menu_selection(&self) -> bool {
        self.visible_text != self.effective_prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_option_splits_label_and_prompt() {
        let option = MenuOption::new("Refunds", "Summarize the complete refund policy.");
        let input = TurnInput::from_menu_option(&option);

        assert_eq!(input.visible_text, "Refunds");
        assert_eq!(input.effective_prompt, "Summarize the complete refund policy.");
        assert!(input.is_menu_selection());
        assert!(!TurnInput::text("hi").is_menu_selection());
    }
}
