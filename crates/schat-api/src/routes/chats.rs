use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use schat_core::AppState;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatRequest {
    pub other_user_id: i64,
}

pub async fn list_chats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Value>>, ApiError> {
    let summaries = schat_core::chat::list_chats(&state.db, auth.user_id).await?;
    let chats = summaries
        .into_iter()
        .map(|summary| {
            let other_presence = state.presence.get(summary.other_user.id);
            json!({
                "id": summary.chat.id,
                "user1Id": summary.chat.user1_id,
                "user2Id": summary.chat.user2_id,
                "createdAt": summary.chat.created_at,
                "updatedAt": summary.chat.updated_at,
                "otherUser": summary.other_user,
                "otherUserOnline": other_presence.is_some_and(|p| p.is_online),
                "lastMessage": summary.last_message,
            })
        })
        .collect();
    Ok(Json(chats))
}

pub async fn open_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<OpenChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = schat_core::chat::open_chat(&state.db, auth.user_id, body.other_user_id).await?;
    Ok(Json(chat))
}

/// History for a participant. Reading it delivers the counterpart's
/// outstanding messages.
pub async fn chat_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = schat_core::chat::participant_chat(&state.db, chat_id, auth.user_id).await?;
    let delivered = state.delivery.deliver_backlog(chat.id, auth.user_id).await?;
    if delivered > 0 {
        tracing::debug!(chat_id, user_id = auth.user_id, delivered, "history delivered backlog");
    }
    let messages = schat_core::message::chat_history(&state.db, chat.id).await?;
    Ok(Json(messages))
}
