//! Conversation Turns
//!
//! Standard turn format used across the agent system. A [`Conversation`] is
//! append-only: turns can be pushed and read, never edited or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::tool::{ToolCall, ToolResult};

/// Role of a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response or tool request
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single turn in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    /// Turn role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Tool calls issued by the assistant in this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Originating call ID (tool turns only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn requesting tool invocations; `content` is any text the
    /// model produced alongside the requests.
    pub fn tool_request(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut turn = Self::assistant(content);
        turn.tool_calls = calls;
        turn
    }

    /// Tool result turn correlated with its call
    pub fn tool_result(result: &ToolResult) -> Self {
        let mut turn = Self::new(Role::Tool, result.to_turn_content());
        turn.tool_call_id = Some(result.id.clone());
        turn
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Call IDs requested in `turns` that have no matching tool turn
pub fn unresolved_tool_calls(turns: &[Turn]) -> Vec<&str> {
    let answered: HashSet<&str> = turns
        .iter()
        .filter(|t| t.role == Role::Tool)
        .filter_map(|t| t.tool_call_id.as_deref())
        .collect();

    turns
        .iter()
        .flat_map(|t| t.tool_calls.iter())
        .map(|c| c.id.as_str())
        .filter(|id| !answered.contains(id))
        .collect()
}

/// Append-only conversation history
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Turn::system(prompt));
        conv
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn unresolved_tool_calls(&self) -> Vec<&str> {
        unresolved_tool_calls(&self.turns)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
