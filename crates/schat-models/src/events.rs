use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Inbound `type` tags the gateway understands.
pub const CLIENT_EVENT_TYPES: &[&str] = &["auth", "send_message", "typing", "mark_read"];

/// Events a client sends over its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Auth { token: String },
    SendMessage { chat_id: i64, content: String },
    Typing { chat_id: i64, is_typing: bool },
    MarkRead { message_id: i64 },
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::SendMessage { .. } => "send_message",
            Self::Typing { .. } => "typing",
            Self::MarkRead { .. } => "mark_read",
        }
    }
}

/// Events the server pushes to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    AuthSuccess,
    AuthError {
        message: String,
    },
    MessageSent {
        message: Message,
    },
    NewMessage {
        message: Message,
    },
    TypingStatus {
        chat_id: i64,
        user_id: i64,
        is_typing: bool,
    },
    MessageRead {
        message_id: i64,
        chat_id: i64,
        read_by: i64,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthSuccess => "auth_success",
            Self::AuthError { .. } => "auth_error",
            Self::MessageSent { .. } => "message_sent",
            Self::NewMessage { .. } => "new_message",
            Self::TypingStatus { .. } => "typing_status",
            Self::MessageRead { .. } => "message_read",
        }
    }
}
