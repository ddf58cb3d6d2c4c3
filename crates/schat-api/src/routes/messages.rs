use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use schat_core::store::NewMessage;
use schat_core::AppState;
use schat_models::message::MessageStatus;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub chat_id: i64,
    pub content: String,
}

/// Store a message without pushing it; the recipient sees it on their next
/// history fetch.
pub async fn create_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = schat_core::chat::participant_chat(&state.db, body.chat_id, auth.user_id).await?;
    schat_core::message::validate_content(&body.content)?;
    let message = state
        .store
        .create_message(NewMessage {
            chat_id: chat.id,
            sender_id: auth.user_id,
            content: body.content,
            status: MessageStatus::Sent,
        })
        .await?;
    tracing::debug!(
        message_id = message.id,
        chat_id = chat.id,
        sender_id = auth.user_id,
        "message stored over http"
    );
    Ok((StatusCode::CREATED, Json(message)))
}
