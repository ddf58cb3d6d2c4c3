use schat_core::delivery::DeliveryStateMachine;
use schat_core::error::CoreError;
use schat_core::message::validate_content;
use schat_core::registry::{ConnectionHandle, ConnectionRegistry};
use schat_core::store::{ChatStore, NewMessage};
use schat_core::AppState;
use schat_models::events::{ClientEvent, ServerEvent};
use schat_models::message::MessageStatus;
use std::sync::Arc;
use thiserror::Error;

/// Why an authenticated event was not acted on.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("chat {0} not found")]
    ChatNotFound(i64),
    #[error("message {0} not found")]
    MessageNotFound(i64),
    #[error("user is not a participant of chat {0}")]
    NotParticipant(i64),
    #[error("user is not the recipient of message {0}")]
    NotRecipient(i64),
    #[error("invalid content: {0}")]
    InvalidContent(String),
    #[error("persistence failure: {0}")]
    Persistence(#[from] CoreError),
}

impl RouteError {
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Dispatches authenticated events. Every routing decision consults the
/// registry at the time of the event.
#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn ChatStore>,
    registry: Arc<ConnectionRegistry>,
    delivery: DeliveryStateMachine,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn ChatStore>,
        registry: Arc<ConnectionRegistry>,
        delivery: DeliveryStateMachine,
    ) -> Self {
        Self {
            store,
            registry,
            delivery,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.registry.clone(),
            state.delivery.clone(),
        )
    }

    /// Handle one event from `user_id`, whose own connection is `origin`.
    pub async fn route(
        &self,
        user_id: i64,
        origin: &ConnectionHandle,
        event: ClientEvent,
    ) -> Result<(), RouteError> {
        match event {
            ClientEvent::Auth { .. } => Ok(()),
            ClientEvent::SendMessage { chat_id, content } => {
                self.send_message(user_id, origin, chat_id, content).await
            }
            ClientEvent::Typing { chat_id, is_typing } => {
                self.typing(user_id, chat_id, is_typing).await
            }
            ClientEvent::MarkRead { message_id } => self.mark_read(user_id, message_id).await,
        }
    }

    async fn send_message(
        &self,
        user_id: i64,
        origin: &ConnectionHandle,
        chat_id: i64,
        content: String,
    ) -> Result<(), RouteError> {
        if let Err(err) = validate_content(&content) {
            return Err(RouteError::InvalidContent(err.to_string()));
        }
        let chat = self
            .store
            .get_chat_by_id(chat_id)
            .await?
            .ok_or(RouteError::ChatNotFound(chat_id))?;
        let recipient_id = chat
            .other_participant(user_id)
            .ok_or(RouteError::NotParticipant(chat_id))?;

        let mut message = self
            .store
            .create_message(NewMessage {
                chat_id,
                sender_id: user_id,
                content,
                status: MessageStatus::Sent,
            })
            .await?;
        match self.store.get_user(user_id).await {
            Ok(sender) => message.sender = sender,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "router: sender profile unavailable");
            }
        }

        origin.send(ServerEvent::MessageSent {
            message: message.clone(),
        });

        let Some(peer) = self.registry.lookup(recipient_id) else {
            tracing::debug!(
                message_id = message.id,
                recipient_id,
                "router: recipient offline, message stays sent"
            );
            return Ok(());
        };
        if !peer.send(ServerEvent::NewMessage {
            message: message.clone(),
        }) {
            tracing::debug!(
                message_id = message.id,
                recipient_id,
                "router: recipient mailbox unavailable, message stays sent"
            );
            return Ok(());
        }
        self.delivery.mark_delivered(&message).await?;
        Ok(())
    }

    async fn typing(&self, user_id: i64, chat_id: i64, is_typing: bool) -> Result<(), RouteError> {
        let chat = self
            .store
            .get_chat_by_id(chat_id)
            .await?
            .ok_or(RouteError::ChatNotFound(chat_id))?;
        let peer_id = chat
            .other_participant(user_id)
            .ok_or(RouteError::NotParticipant(chat_id))?;
        if let Some(peer) = self.registry.lookup(peer_id) {
            peer.send(ServerEvent::TypingStatus {
                chat_id,
                user_id,
                is_typing,
            });
        }
        Ok(())
    }

    async fn mark_read(&self, user_id: i64, message_id: i64) -> Result<(), RouteError> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(RouteError::MessageNotFound(message_id))?;
        if message.sender_id == user_id {
            return Err(RouteError::NotRecipient(message_id));
        }
        let chat = self
            .store
            .get_chat_by_id(message.chat_id)
            .await?
            .ok_or(RouteError::ChatNotFound(message.chat_id))?;
        if !chat.has_participant(user_id) {
            return Err(RouteError::NotRecipient(message_id));
        }

        let transition = self.delivery.mark_read(&message).await?;
        if !transition.is_advanced() {
            return Ok(());
        }
        if let Some(sender) = self.registry.lookup(message.sender_id) {
            sender.send(ServerEvent::MessageRead {
                message_id,
                chat_id: message.chat_id,
                read_by: user_id,
            });
        }
        Ok(())
    }
}
