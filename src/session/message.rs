//! Conversation messages as shown to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id of the greeting every session starts with.
pub const WELCOME_MESSAGE_ID: &str = "initial-ai-message";

/// Opaque message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    fn with_prefix(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Model,
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(id: MessageId, text: String, sender: Sender) -> Self {
        Self {
            id,
            text,
            sender,
            created_at: Utc::now(),
        }
    }

    /// A turn typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageId::with_prefix("user"), text.into(), Sender::User)
    }

    /// A reply from the model.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(MessageId::with_prefix("ai"), text.into(), Sender::Model)
    }

    /// A model-role message reporting a failed turn.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageId::with_prefix("error"), text.into(), Sender::Model)
    }

    /// The greeting shown before the first turn.
    pub fn welcome(text: impl Into<String>) -> Self {
        Self::new(
            MessageId(WELCOME_MESSAGE_ID.to_string()),
            text.into(),
            Sender::Model,
        )
    }
}
