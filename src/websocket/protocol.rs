//! Wire protocol for the chat WebSocket.
//!
//! Client frames and server events are both JSON objects tagged by `type`.
//! Required-but-absent fields are modeled as `Option` so a malformed frame
//! produces an `error` event instead of tearing the connection down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserSummary;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "join_conversation")]
    JoinConversation { conversation_id: Option<Uuid> },

    #[serde(rename = "leave_conversation")]
    LeaveConversation,

    #[serde(rename = "send_message")]
    SendMessage {
        conversation_id: Option<Uuid>,
        content: Option<String>,
    },

    #[serde(rename = "typing")]
    Typing {
        #[serde(default)]
        is_typing: bool,
    },

    #[serde(rename = "mark_read")]
    MarkRead { message_id: Option<Uuid> },
}

/// Body of a `new_message` event, also mirrored to the side channel.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub id: Uuid,
    pub conversation: Uuid,
    pub sender: UserSummary,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "joined_conversation")]
    JoinedConversation { conversation_id: Uuid },

    #[serde(rename = "new_message")]
    NewMessage { message: MessagePayload },

    #[serde(rename = "typing_indicator")]
    TypingIndicator { user: UserSummary, is_typing: bool },

    #[serde(rename = "message_read_receipt")]
    MessageReadReceipt {
        message_id: Uuid,
        conversation_id: Uuid,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Receiver-side filter: a client never re-renders its own typing
    /// indicator, even across multiple sessions of the same identity.
    pub fn suppressed_for(&self, user_id: Uuid) -> bool {
        matches!(self, ServerEvent::TypingIndicator { user, .. } if user.id == user_id)
    }
}
