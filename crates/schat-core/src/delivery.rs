use schat_models::message::{Message, MessageStatus};
use std::sync::Arc;

use crate::error::CoreError;
use crate::store::ChatStore;

/// Outcome of a status transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced {
        from: MessageStatus,
        to: MessageStatus,
    },
    Unchanged,
}

impl Transition {
    pub fn is_advanced(self) -> bool {
        matches!(self, Self::Advanced { .. })
    }
}

/// Drives messages along `sent -> delivered -> read`. Requests that would
/// not move forward are no-ops; the store enforces the same rule so racing
/// requests cannot regress a message.
#[derive(Clone)]
pub struct DeliveryStateMachine {
    store: Arc<dyn ChatStore>,
}

impl DeliveryStateMachine {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn mark_delivered(&self, message: &Message) -> Result<Transition, CoreError> {
        self.advance(message, MessageStatus::Delivered).await
    }

    /// `sent -> read` is allowed directly.
    pub async fn mark_read(&self, message: &Message) -> Result<Transition, CoreError> {
        self.advance(message, MessageStatus::Read).await
    }

    /// Deliver everything the counterpart left `sent` in a chat, when
    /// `recipient_id` fetches its history.
    pub async fn deliver_backlog(&self, chat_id: i64, recipient_id: i64) -> Result<u64, CoreError> {
        let count = self.store.mark_chat_delivered(chat_id, recipient_id).await?;
        if count > 0 {
            tracing::debug!(chat_id, recipient_id, count, "delivery: backlog delivered");
        }
        Ok(count)
    }

    async fn advance(
        &self,
        message: &Message,
        target: MessageStatus,
    ) -> Result<Transition, CoreError> {
        if !message.status.can_advance_to(target) {
            return Ok(Transition::Unchanged);
        }
        let moved = self.store.update_message_status(message.id, target).await?;
        if !moved {
            return Ok(Transition::Unchanged);
        }
        tracing::debug!(
            message_id = message.id,
            from = %message.status,
            to = %target,
            "delivery: status advanced"
        );
        Ok(Transition::Advanced {
            from: message.status,
            to: target,
        })
    }
}
