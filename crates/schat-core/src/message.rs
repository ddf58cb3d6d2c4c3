use schat_db::DbPool;
use schat_models::message::Message;

use crate::error::CoreError;
use crate::store::message_with_sender;

pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Content must carry something besides whitespace and fit the length cap.
pub fn validate_content(content: &str) -> Result<(), CoreError> {
    if content.trim().is_empty() {
        return Err(CoreError::BadRequest("message content is empty".into()));
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(CoreError::BadRequest(format!(
            "message content exceeds {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Chat history oldest first, each message carrying its sender profile.
pub async fn chat_history(pool: &DbPool, chat_id: i64) -> Result<Vec<Message>, CoreError> {
    schat_db::messages::get_chat_messages(pool, chat_id)
        .await?
        .into_iter()
        .map(message_with_sender)
        .collect()
}
