//! Inbound events and outbound keyboard types.

use serde::{Deserialize, Serialize};

/// Event delivered by a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEvent {
    /// `/start` command
    Start { user_id: String, chat_id: String },
    /// Any other message. Non-text messages arrive with empty text.
    Text {
        user_id: String,
        chat_id: String,
        text: String,
    },
    /// Inline button press
    Callback {
        query_id: String,
        user_id: String,
        chat_id: String,
        data: String,
    },
}

impl InboundEvent {
    /// User the event belongs to.
    pub fn user_id(&self) -> &str {
        match self {
            Self::Start { user_id, .. }
            | Self::Text { user_id, .. }
            | Self::Callback { user_id, .. } => user_id,
        }
    }

    /// Chat replies should go to.
    pub fn chat_id(&self) -> &str {
        match self {
            Self::Start { chat_id, .. }
            | Self::Text { chat_id, .. }
            | Self::Callback { chat_id, .. } => chat_id,
        }
    }

    /// Short name for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Text { .. } => "text",
            Self::Callback { .. } => "callback",
        }
    }
}

/// A single inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let event = InboundEvent::Callback {
            query_id: "q".into(),
            user_id: "u".into(),
            chat_id: "c".into(),
            data: "solved".into(),
        };
        assert_eq!(event.user_id(), "u");
        assert_eq!(event.chat_id(), "c");
        assert_eq!(event.kind(), "callback");
    }

    #[test]
    fn event_serialization() {
        let event = InboundEvent::Text {
            user_id: "1".into(),
            chat_id: "2".into(),
            text: "hello".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text");
        let parsed: InboundEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }
}
