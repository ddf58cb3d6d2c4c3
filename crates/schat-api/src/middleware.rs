use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use schat_core::auth::AuthError;
use schat_core::AppState;

/// The caller identified by a `Bearer` token.
pub struct AuthUser {
    pub user_id: i64,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::UNAUTHORIZED, "Invalid authorization format"))?;

        let user_id = state.verifier.verify(token).map_err(|err| match err {
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            _ => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
        })?;

        Ok(AuthUser { user_id })
    }
}
