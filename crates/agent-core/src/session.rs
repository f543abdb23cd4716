//! Session State
//!
//! A session is the conversation owned by one [`crate::Agent`], plus when it
//! began and when it last changed. Nothing outlives the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Conversation, Turn};

/// Identifies a session in logs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Conversation state for one agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Append-only; reachable mutably only through [`Session::append`]
    conversation: Conversation,

    pub created_at: DateTime<Utc>,

    /// Time of the most recent turn
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::starting_with(Conversation::new())
    }

    /// Session whose first turn is the given system prompt
    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self::starting_with(Conversation::with_system_prompt(system_prompt))
    }

    #[must_use]
    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    fn starting_with(conversation: Conversation) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation,
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn append(&mut self, turn: Turn) {
        self.updated_at = turn.timestamp.max(self.updated_at);
        self.conversation.push(turn);
    }

    pub fn turn_count(&self) -> usize {
        self.conversation.len()
    }

    /// Time between creation and the latest turn
    pub fn duration(&self) -> chrono::Duration {
        self.updated_at - self.created_at
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
