use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schat_db::{
    chats::ChatRow,
    messages::{MessageRow, MessageWithSenderRow},
    users::UserRow,
    DbPool,
};
use schat_models::{
    chat::Chat,
    message::{Message, MessageStatus},
    user::PublicUser,
};

use crate::error::CoreError;

/// Input for persisting a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub status: MessageStatus,
}

/// Persistence operations the gateway needs. Implementations must make
/// `update_message_status` refuse backward moves.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<PublicUser>, CoreError>;

    async fn get_chat_by_id(&self, chat_id: i64) -> Result<Option<Chat>, CoreError>;

    async fn create_message(&self, new: NewMessage) -> Result<Message, CoreError>;

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>, CoreError>;

    /// Returns `true` when the stored status moved.
    async fn update_message_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<bool, CoreError>;

    /// Advance the counterpart's `sent` messages in a chat to `delivered`.
    async fn mark_chat_delivered(&self, chat_id: i64, recipient_id: i64)
        -> Result<u64, CoreError>;

    async fn update_user_online_status(
        &self,
        user_id: i64,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

/// `ChatStore` backed by the SQL pool.
#[derive(Clone)]
pub struct SqlChatStore {
    pool: DbPool,
}

impl SqlChatStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for SqlChatStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<PublicUser>, CoreError> {
        let row = schat_db::users::get_user_by_id(&self.pool, user_id).await?;
        Ok(row.as_ref().map(public_user))
    }

    async fn get_chat_by_id(&self, chat_id: i64) -> Result<Option<Chat>, CoreError> {
        let row = schat_db::chats::get_chat(&self.pool, chat_id).await?;
        Ok(row.map(chat_from_row))
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message, CoreError> {
        let row = schat_db::messages::create_message(
            &self.pool,
            new.chat_id,
            new.sender_id,
            &new.content,
            new.status.as_str(),
        )
        .await?;
        message_from_row(row)
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>, CoreError> {
        schat_db::messages::get_message(&self.pool, message_id)
            .await?
            .map(message_from_row)
            .transpose()
    }

    async fn update_message_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<bool, CoreError> {
        let moved = schat_db::messages::advance_message_status(
            &self.pool,
            message_id,
            status.as_str(),
            status.rank(),
        )
        .await?;
        Ok(moved)
    }

    async fn mark_chat_delivered(
        &self,
        chat_id: i64,
        recipient_id: i64,
    ) -> Result<u64, CoreError> {
        let count =
            schat_db::messages::mark_chat_delivered(&self.pool, chat_id, recipient_id).await?;
        Ok(count)
    }

    async fn update_user_online_status(
        &self,
        user_id: i64,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let updated =
            schat_db::users::update_online_status(&self.pool, user_id, is_online, at).await?;
        if !updated {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}

pub fn public_user(row: &UserRow) -> PublicUser {
    PublicUser {
        id: row.id,
        full_name: row.full_name.clone(),
        schat_id: row.schat_id.clone(),
        profile_image_url: row.profile_image_url.clone(),
    }
}

pub fn chat_from_row(row: ChatRow) -> Chat {
    Chat {
        id: row.id,
        user1_id: row.user1_id,
        user2_id: row.user2_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn message_from_row(row: MessageRow) -> Result<Message, CoreError> {
    let status = row
        .status
        .parse::<MessageStatus>()
        .map_err(|e| CoreError::Internal(format!("message {}: {e}", row.id)))?;
    Ok(Message {
        id: row.id,
        chat_id: row.chat_id,
        sender_id: row.sender_id,
        content: row.content,
        status,
        created_at: row.created_at,
        sender: None,
    })
}

pub fn message_with_sender(row: MessageWithSenderRow) -> Result<Message, CoreError> {
    let sender = PublicUser {
        id: row.message.sender_id,
        full_name: row.sender_full_name,
        schat_id: row.sender_schat_id,
        profile_image_url: row.sender_profile_image_url,
    };
    let mut message = message_from_row(row.message)?;
    message.sender = Some(sender);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schat_db::{create_pool, run_migrations};

    async fn store_with_chat() -> (SqlChatStore, i64, i64, i64) {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let a = schat_db::users::create_user(&pool, "a@example.com", "h", "Ann", "SCHAT_AAAAAA")
            .await
            .unwrap();
        let b = schat_db::users::create_user(&pool, "b@example.com", "h", "Ben", "SCHAT_BBBBBB")
            .await
            .unwrap();
        let chat = schat_db::chats::get_or_create_chat(&pool, a.id, b.id)
            .await
            .unwrap();
        (SqlChatStore::new(pool), chat.id, a.id, b.id)
    }

    #[tokio::test]
    async fn sql_store_persists_and_advances_messages() {
        let (store, chat_id, a, b) = store_with_chat().await;

        let chat = store.get_chat_by_id(chat_id).await.unwrap().unwrap();
        assert_eq!(chat.other_participant(a), Some(b));

        let message = store
            .create_message(NewMessage {
                chat_id,
                sender_id: a,
                content: "hi".to_string(),
                status: MessageStatus::Sent,
            })
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Sent);

        assert!(store
            .update_message_status(message.id, MessageStatus::Delivered)
            .await
            .unwrap());
        assert!(!store
            .update_message_status(message.id, MessageStatus::Delivered)
            .await
            .unwrap());

        let stored = store.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Delivered);

        let sender = store.get_user(a).await.unwrap().unwrap();
        assert_eq!(sender.schat_id, "SCHAT_AAAAAA");
    }

    #[tokio::test]
    async fn presence_mirror_reports_missing_user() {
        let (store, _, a, _) = store_with_chat().await;
        store
            .update_user_online_status(a, true, Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            store.update_user_online_status(a + 1000, true, Utc::now()).await,
            Err(CoreError::NotFound)
        ));
    }
}
