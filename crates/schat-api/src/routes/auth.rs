use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use schat_core::auth::{self, AuthError};
use schat_core::AppState;
use serde::Deserialize;
use serde_json::json;

use super::user_json;
use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.registration_enabled {
        return Err(AuthError::RegistrationDisabled.into());
    }
    let user =
        schat_core::user::register_user(&state.db, &body.email, &body.password, &body.full_name)
            .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "schatId": user.schat_id,
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = schat_core::user::authenticate(&state.db, &body.email, &body.password).await?;
    let token = auth::create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )?;
    state.sessions.login(user.id).await;
    tracing::info!(user_id = user.id, "user logged in");

    Ok(Json(json!({
        "token": token,
        "user": user_json(&state, &user),
    })))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(auth.user_id).await;
    tracing::info!(user_id = auth.user_id, "user logged out");
    Ok(Json(json!({ "message": "Logged out" })))
}
