use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use schat_core::AppState;

use super::user_json;
use crate::error::ApiError;
use crate::middleware::AuthUser;

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = schat_core::user::get_user(&state.db, auth.user_id).await?;
    Ok(Json(user_json(&state, &user)))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(schat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = schat_core::user::find_by_schat_id(&state.db, auth.user_id, &schat_id).await?;
    Ok(Json(user_json(&state, &user)))
}
