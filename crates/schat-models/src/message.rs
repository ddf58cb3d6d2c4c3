use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::user::PublicUser;

/// Delivery status of a persisted message. Ordering follows the lifecycle,
/// so `Sent < Delivered < Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    pub fn rank(self) -> i32 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Read => 2,
        }
    }

    /// Whether moving to `target` is a forward step.
    pub fn can_advance_to(self, target: MessageStatus) -> bool {
        target > self
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for MessageStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<PublicUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_follows_lifecycle() {
        assert!(MessageStatus::Sent < MessageStatus::Delivered);
        assert!(MessageStatus::Delivered < MessageStatus::Read);
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Read));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Delivered));
    }

    #[test]
    fn status_parses_storage_text() {
        assert_eq!("delivered".parse::<MessageStatus>(), Ok(MessageStatus::Delivered));
        let err = "seen".parse::<MessageStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("seen".to_string()));
        assert_eq!(err.to_string(), "unknown message status 'seen'");
    }

    #[test]
    fn message_serializes_camel_case_without_missing_sender() {
        let message = Message {
            id: 1,
            chat_id: 7,
            sender_id: 3,
            content: "hi".to_string(),
            status: MessageStatus::Sent,
            created_at: Utc::now(),
            sender: None,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["chatId"], 7);
        assert_eq!(value["senderId"], 3);
        assert_eq!(value["status"], "sent");
        assert!(value.get("sender").is_none());
        assert!(value.get("createdAt").is_some());
    }
}
