pub mod auth;
pub mod chats;
pub mod messages;
pub mod users;

use schat_core::AppState;
use schat_db::users::UserRow;
use serde_json::{json, Value};

/// Profile as returned to clients, with presence taken from the live store
/// when the user has been seen since startup.
pub(crate) fn user_json(state: &AppState, user: &UserRow) -> Value {
    let (is_online, last_seen) = match state.presence.get(user.id) {
        Some(presence) => (presence.is_online, presence.last_seen),
        None => (user.is_online, user.last_seen),
    };
    json!({
        "id": user.id,
        "email": user.email,
        "fullName": user.full_name,
        "schatId": user.schat_id,
        "profileImageUrl": user.profile_image_url,
        "statusText": user.status_text,
        "isOnline": is_online,
        "lastSeen": last_seen,
        "createdAt": user.created_at,
    })
}
