//! Session types.

use chrono::{DateTime, Utc};
use helpdesk_common::ReplyRole;
use serde::{Deserialize, Serialize};

/// Role of a message replayed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Wire name used by chat-completion APIs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl From<ReplyRole> for MessageRole {
    fn from(role: ReplyRole) -> Self {
        match role {
            ReplyRole::Assistant => Self::Assistant,
            ReplyRole::System => Self::System,
        }
    }
}

/// A role-tagged prompt item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }
}

/// Author of a transcript record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    System,
    User,
    Bot,
}

impl HistoryRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Bot => "bot",
        }
    }

    /// Upper-case label used in transcript files.
    pub const fn label(self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::User => "USER",
            Self::Bot => "BOT",
        }
    }
}

/// A human-readable history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation state for one user.
///
/// `messages[0]` and `history[0]` are always the system instruction;
/// both lists only grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    messages: Vec<PromptMessage>,
    history: Vec<HistoryEntry>,
}

impl Session {
    /// Create a session holding only the system instruction.
    pub fn new(system_prompt: &str, now: DateTime<Utc>) -> Self {
        Self {
            messages: vec![PromptMessage::system(system_prompt)],
            history: vec![HistoryEntry {
                role: HistoryRole::System,
                text: system_prompt.to_string(),
                timestamp: now,
            }],
        }
    }

    /// Prompt sequence replayed to the model.
    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    /// Full transcript history.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Number of user/bot turns after the system instruction.
    pub fn turns(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    pub(crate) fn push_user(&mut self, text: &str, timestamp: DateTime<Utc>) {
        self.messages.push(PromptMessage::user(text));
        self.history.push(HistoryEntry {
            role: HistoryRole::User,
            text: text.to_string(),
            timestamp,
        });
    }

    pub(crate) fn push_bot(&mut self, text: &str, timestamp: DateTime<Utc>, role: MessageRole) {
        self.messages.push(PromptMessage::new(role, text));
        self.history.push(HistoryEntry {
            role: HistoryRole::Bot,
            text: text.to_string(),
            timestamp,
        });
    }
}
