//! In-process chat history, serialised per session
//!
//! The store is bounded: idle sessions expire, the least recently used
//! session makes room for a new one at capacity, and each history keeps
//! only its latest turns. Sessions with a turn in flight are never evicted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::types::{BotId, ChatTurn, SessionId};

/// One conversation, bound to the bot it started with
pub struct ChatSession {
    pub id: SessionId,
    pub bot_id: BotId,
    pub created_at: DateTime<Utc>,
    last_active: parking_lot::Mutex<Instant>,
    max_turns: usize,
    turns: Mutex<Vec<ChatTurn>>,
}

impl ChatSession {
    fn new(id: SessionId, bot_id: BotId, max_turns: usize) -> Self {
        Self {
            id,
            bot_id,
            created_at: Utc::now(),
            last_active: parking_lot::Mutex::new(Instant::now()),
            max_turns,
            turns: Mutex::new(Vec::new()),
        }
    }

    /// Hold the turn lock; concurrent turns in the session queue behind it
    pub async fn lock(&self) -> MutexGuard<'_, Vec<ChatTurn>> {
        self.turns.lock().await
    }

    /// Append a user/assistant exchange, dropping the oldest exchanges past the cap
    pub fn push_exchange(&self, turns: &mut Vec<ChatTurn>, user: ChatTurn, assistant: ChatTurn) {
        turns.push(user);
        turns.push(assistant);
        if turns.len() > self.max_turns {
            let excess = (turns.len() - self.max_turns).div_ceil(2) * 2;
            turns.drain(..excess.min(turns.len()));
        }
        self.touch();
    }

    fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    fn last_active(&self) -> Instant {
        *self.last_active.lock()
    }
}

/// Session histories keyed by id
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<ChatSession>>,
    idle_ttl: Duration,
    max_sessions: usize,
    max_turns: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(&SessionConfig::default())
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            max_sessions: config.max_sessions.max(1),
            max_turns: config.max_turns.max(2),
        }
    }

    /// Existing session for this bot, or a new one
    pub fn open(&self, session_id: SessionId, bot_id: BotId) -> Result<Arc<ChatSession>> {
        let existing = self.sessions.get(&session_id).map(|s| s.clone());
        let session = match existing {
            Some(session) => session,
            None => {
                self.evict();
                self.sessions
                    .entry(session_id)
                    .or_insert_with(|| {
                        tracing::debug!("Opened session {} for bot {}", session_id, bot_id);
                        Arc::new(ChatSession::new(session_id, bot_id, self.max_turns))
                    })
                    .clone()
            }
        };

        if session.bot_id != bot_id {
            return Err(Error::InvalidInput(format!(
                "session {} belongs to another bot",
                session_id
            )));
        }
        session.touch();
        Ok(session)
    }

    /// Drop idle sessions, then the least recently used ones until a new session fits
    fn evict(&self) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        // A held Arc means a turn is in flight
        self.sessions.retain(|_, s| {
            Arc::strong_count(s) > 1 || now.saturating_duration_since(s.last_active()) < self.idle_ttl
        });

        while self.sessions.len() >= self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .filter(|s| Arc::strong_count(s.value()) == 1)
                .min_by_key(|s| s.last_active())
                .map(|s| *s.key());
            match oldest {
                Some(session_id) => {
                    self.sessions.remove(&session_id);
                }
                None => break,
            }
        }

        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::debug!("Evicted {} chat sessions", evicted);
        }
        evicted
    }

    pub async fn history(&self, session_id: SessionId) -> Result<Vec<ChatTurn>> {
        let session = self
            .sessions
            .get(&session_id)
            .map(|s| s.clone())
            .ok_or_else(|| Error::not_found("session", session_id))?;
        let turns = session.lock().await;
        Ok(turns.clone())
    }

    /// Forget a session; false if it did not exist
    pub fn clear(&self, session_id: SessionId) -> bool {
        self.sessions.remove(&session_id).is_some()
    }

    /// Drop every session of a deleted bot
    pub fn remove_bot(&self, bot_id: BotId) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.bot_id != bot_id);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
