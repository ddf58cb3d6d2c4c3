use schat_db::DbPool;
use schat_models::{chat::Chat, message::Message, user::PublicUser};

use crate::error::CoreError;
use crate::store::{chat_from_row, message_from_row, public_user};

/// A chat as listed for one of its participants.
#[derive(Debug, Clone)]
pub struct ChatSummary {
    pub chat: Chat,
    pub other_user: PublicUser,
    pub last_message: Option<Message>,
}

/// Get or create the chat between `user_id` and `other_user_id`.
pub async fn open_chat(pool: &DbPool, user_id: i64, other_user_id: i64) -> Result<Chat, CoreError> {
    if user_id == other_user_id {
        return Err(CoreError::BadRequest("cannot open a chat with yourself".into()));
    }
    if schat_db::users::get_user_by_id(pool, other_user_id)
        .await?
        .is_none()
    {
        return Err(CoreError::NotFound);
    }
    let row = schat_db::chats::get_or_create_chat(pool, user_id, other_user_id).await?;
    Ok(chat_from_row(row))
}

/// Load a chat the caller takes part in.
pub async fn participant_chat(pool: &DbPool, chat_id: i64, user_id: i64) -> Result<Chat, CoreError> {
    let chat = schat_db::chats::get_chat(pool, chat_id)
        .await?
        .map(chat_from_row)
        .ok_or(CoreError::NotFound)?;
    if !chat.has_participant(user_id) {
        return Err(CoreError::Forbidden);
    }
    Ok(chat)
}

pub async fn list_chats(pool: &DbPool, user_id: i64) -> Result<Vec<ChatSummary>, CoreError> {
    let rows = schat_db::chats::list_user_chats(pool, user_id).await?;
    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let chat = chat_from_row(row);
        let Some(other_id) = chat.other_participant(user_id) else {
            continue;
        };
        let Some(other) = schat_db::users::get_user_by_id(pool, other_id).await? else {
            tracing::warn!(chat_id = chat.id, other_id, "chat counterpart missing");
            continue;
        };
        let last_message = schat_db::messages::get_last_message(pool, chat.id)
            .await?
            .map(message_from_row)
            .transpose()?;
        summaries.push(ChatSummary {
            other_user: public_user(&other),
            last_message,
            chat,
        });
    }
    Ok(summaries)
}
