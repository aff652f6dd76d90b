//! Bot records and their editable fields

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BotId, TenantId};

/// Predefined chat shortcut: a friendly label shown to the end user and
/// a more explicit instruction sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    pub label: String,
    pub prompt: String,
}

impl MenuOption {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
        }
    }
}

/// A chatbot owned by exactly one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    /// Persona / system prompt
    pub system_prompt: Option<String>,
    pub greeting_message: Option<String>,
    /// Avatar reference (URL or asset key)
    pub avatar: Option<String>,
    /// Ordered; may be empty
    #[serde(default)]
    pub menu_options: Vec<MenuOption>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bot {
    /// Create a bot from a draft
    pub fn from_draft(tenant_id: TenantId, draft: BotDraft) -> Self {
        let now = Utc::now();
        Self {
            id: BotId::new(),
            tenant_id,
            name: draft.name,
            description: draft.description,
            system_prompt: draft.system_prompt,
            greeting_message: draft.greeting_message,
            avatar: draft.avatar,
            menu_options: draft.menu_options,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update; absent fields are left untouched
    pub fn apply(&mut self, update: BotUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(prompt) = update.system_prompt {
            self.system_prompt = Some(prompt);
        }
        if let Some(greeting) = update.greeting_message {
            self.greeting_message = Some(greeting);
        }
        if let Some(avatar) = update.avatar {
            self.avatar = Some(avatar);
        }
        if let Some(options) = update.menu_options {
            self.menu_options = options;
        }
        self.updated_at = Utc::now();
    }

    /// Greeting shown when a chat opens
    pub fn greeting(&self) -> String {
        self.greeting_message
            .clone()
            .unwrap_or_else(|| format!("Hello! I'm {}. How can I help you today?", self.name))
    }

    pub fn menu_option(&self, index: usize) -> Option<&MenuOption> {
        self.menu_options.get(index)
    }
}

/// Fields for creating a bot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub greeting_message: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub menu_options: Vec<MenuOption>,
}

impl BotDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial bot update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    pub greeting_message: Option<String>,
    pub avatar: Option<String>,
    pub menu_options: Option<Vec<MenuOption>>,
}
