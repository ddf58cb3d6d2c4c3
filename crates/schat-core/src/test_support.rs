use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schat_models::{
    chat::Chat,
    message::{Message, MessageStatus},
    user::PublicUser,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::CoreError;
use crate::store::{ChatStore, NewMessage};

/// In-memory `ChatStore` for unit tests.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<i64, PublicUser>>,
    chats: Mutex<HashMap<i64, Chat>>,
    messages: Mutex<Vec<Message>>,
    presence: Mutex<HashMap<i64, bool>>,
    fail_presence: AtomicBool,
}

impl MemoryStore {
    pub fn add_chat(&self, id: i64, user1_id: i64, user2_id: i64) {
        let now = Utc::now();
        self.chats.lock().unwrap().insert(
            id,
            Chat {
                id,
                user1_id,
                user2_id,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn status_of(&self, message_id: i64) -> Option<MessageStatus> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.status)
    }

    pub fn online_status(&self, user_id: i64) -> Option<bool> {
        self.presence.lock().unwrap().get(&user_id).copied()
    }

    pub fn fail_presence_writes(&self) {
        self.fail_presence.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<PublicUser>, CoreError> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn get_chat_by_id(&self, chat_id: i64) -> Result<Option<Chat>, CoreError> {
        Ok(self.chats.lock().unwrap().get(&chat_id).cloned())
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message, CoreError> {
        let mut messages = self.messages.lock().unwrap();
        let message = Message {
            id: messages.len() as i64 + 1,
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            content: new.content,
            status: new.status,
            created_at: Utc::now(),
            sender: None,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>, CoreError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn update_message_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<bool, CoreError> {
        let mut messages = self.messages.lock().unwrap();
        let Some(message) = messages.iter_mut().find(|m| m.id == message_id) else {
            return Ok(false);
        };
        if !message.status.can_advance_to(status) {
            return Ok(false);
        }
        message.status = status;
        Ok(true)
    }

    async fn mark_chat_delivered(
        &self,
        chat_id: i64,
        recipient_id: i64,
    ) -> Result<u64, CoreError> {
        let mut count = 0;
        for message in self.messages.lock().unwrap().iter_mut() {
            if message.chat_id == chat_id
                && message.sender_id != recipient_id
                && message.status == MessageStatus::Sent
            {
                message.status = MessageStatus::Delivered;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update_user_online_status(
        &self,
        user_id: i64,
        is_online: bool,
        _at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if self.fail_presence.load(Ordering::SeqCst) {
            return Err(CoreError::Internal("presence writes disabled".to_string()));
        }
        self.presence.lock().unwrap().insert(user_id, is_online);
        Ok(())
    }
}
