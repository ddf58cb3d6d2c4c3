pub mod error;
pub mod middleware;
pub mod routes;

use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use schat_core::AppState;
use serde_json::json;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Auth
        .route("/api/auth/signup", post(routes::auth::signup))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        // Users
        .route("/api/user/me", get(routes::users::me))
        .route("/api/user/search/{schat_id}", get(routes::users::search))
        // Chats
        .route(
            "/api/chats",
            get(routes::chats::list_chats).post(routes::chats::open_chat),
        )
        .route(
            "/api/chats/{chat_id}/messages",
            get(routes::chats::chat_messages),
        )
        .route("/api/messages", post(routes::messages::create_message))
        .layer(build_cors_layer())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "schat" })),
    )
}
