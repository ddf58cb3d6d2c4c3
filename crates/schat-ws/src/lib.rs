mod gate;
mod handler;
mod limits;
pub mod protocol;
mod router;

pub use gate::{Admission, AuthGate, GateState};
pub use router::{MessageRouter, RouteError};

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use schat_core::AppState;
use serde::Deserialize;

/// Largest inbound frame the gateway accepts.
const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handler::handle_connection(socket, state, params.token))
}
