use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use schat_core::registry::{ConnectionHandle, Outbound};
use schat_core::AppState;
use schat_models::events::{ClientEvent, ServerEvent};
use std::time::Duration;

use crate::gate::{Admission, AuthGate, REASON_AUTH_TIMEOUT};
use crate::limits::{event_rate_limits, Limited};
use crate::protocol::{decode_client_event, encode_server_event};
use crate::router::{MessageRouter, RouteError};

const PING_INTERVAL: Duration = Duration::from_secs(20);
/// Policy violation; used when authentication fails.
const CLOSE_AUTH_FAILED: u16 = 1008;

pub async fn handle_connection(socket: WebSocket, state: AppState, query_token: Option<String>) {
    let (sender, receiver) = socket.split();
    run_connection(sender, receiver, state, query_token).await;
}

async fn run_connection(
    mut sender: impl SinkExt<Message> + Unpin,
    mut receiver: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
    state: AppState,
    query_token: Option<String>,
) {
    let (handle, mut mailbox) = ConnectionHandle::new(state.config.gateway.outbound_buffer);
    let connection_id = handle.id();
    let mut gate = AuthGate::new();
    let router = MessageRouter::from_state(&state);
    let rate_limits = event_rate_limits(&state.config.gateway);

    if let Some(token) = query_token.filter(|token| !token.trim().is_empty()) {
        if let Admission::Rejected { reason } = gate.admit(&token, &state, &handle).await {
            let _ = reject(&mut sender, connection_id, &reason).await;
            return;
        }
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let auth_deadline = tokio::time::sleep(state.config.gateway.auth_grace());
    tokio::pin!(auth_deadline);

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(
                            target: "schat::wire",
                            connection_id,
                            user_id = ?gate.user_id(),
                            payload = %text.as_str(),
                            "ws in"
                        );
                        let event = match decode_client_event(text.as_str()) {
                            Ok(event) => event,
                            Err(err) => {
                                tracing::debug!(connection_id, error = %err, "gateway: dropping frame");
                                continue;
                            }
                        };
                        match event {
                            ClientEvent::Auth { token } => {
                                match gate.admit(&token, &state, &handle).await {
                                    Admission::Accepted { .. } => {}
                                    Admission::AlreadyAuthenticated => {
                                        tracing::debug!(connection_id, "gateway: repeated auth ignored");
                                    }
                                    Admission::Rejected { reason } => {
                                        let _ = reject(&mut sender, connection_id, &reason).await;
                                        break format!("authentication rejected: {reason}");
                                    }
                                }
                            }
                            event => {
                                let Some(user_id) = gate.user_id() else {
                                    tracing::debug!(
                                        connection_id,
                                        kind = event.kind(),
                                        "gateway: dropping event before authentication"
                                    );
                                    continue;
                                };
                                if let Some((code, reason)) = handle.close_requested() {
                                    let _ = send_close(&mut sender, code, &reason).await;
                                    break format!("closed by server: {reason}");
                                }
                                if let Err(limited) = rate_limits.check(user_id, &event) {
                                    log_rate_limited(user_id, event.kind(), limited);
                                    continue;
                                }
                                if let Err(err) = router.route(user_id, &handle, event).await {
                                    log_route_error(user_id, connection_id, &err);
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(connection_id, "gateway: binary frames are not supported");
                    }
                    Some(Ok(Message::Close(_))) => break "client closed connection".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break format!("websocket error: {err}"),
                    None => break "stream ended".to_string(),
                }
            }
            outbound = mailbox.recv() => {
                match outbound {
                    Some(Outbound::Event(event)) => {
                        if send_event(&mut sender, connection_id, &event).await.is_err() {
                            break "websocket send error".to_string();
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = send_close(&mut sender, code, &reason).await;
                        break format!("closed by server: {reason}");
                    }
                    None => break "mailbox closed".to_string(),
                }
            }
            () = &mut auth_deadline, if !gate.is_authenticated() => {
                gate.reject(REASON_AUTH_TIMEOUT);
                let _ = reject(&mut sender, connection_id, REASON_AUTH_TIMEOUT).await;
                break "authentication timeout".to_string();
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    match gate.user_id() {
        Some(user_id) => {
            let was_current = state.sessions.disconnect(user_id, &handle).await;
            tracing::info!(
                user_id,
                connection_id,
                was_current,
                "Client {} disconnected: {}",
                user_id,
                disconnect_reason
            );
        }
        None => {
            tracing::debug!(
                connection_id,
                "Unauthenticated client disconnected: {}",
                disconnect_reason
            );
        }
    }
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    connection_id: u64,
    event: &ServerEvent,
) -> Result<(), ()> {
    let payload = match encode_server_event(event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(connection_id, kind = event.kind(), error = %err, "gateway: encode failed");
            return Ok(());
        }
    };
    tracing::trace!(target: "schat::wire", connection_id, payload = %payload, "ws out");
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_close(
    sender: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &str,
) -> Result<(), ()> {
    sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
        .map_err(|_| ())
}

/// Tell the client why authentication failed, then close.
async fn reject(
    sender: &mut (impl SinkExt<Message> + Unpin),
    connection_id: u64,
    reason: &str,
) -> Result<(), ()> {
    let event = ServerEvent::AuthError {
        message: reason.to_string(),
    };
    send_event(sender, connection_id, &event).await?;
    send_close(sender, CLOSE_AUTH_FAILED, reason).await
}

fn log_rate_limited(user_id: i64, kind: &str, limited: Limited) {
    match limited {
        Limited::Typing { .. } => {
            tracing::debug!(user_id, kind, "rate limited (silent drop)");
        }
        Limited::Events { retry_after_ms } => {
            tracing::warn!(user_id, kind, retry_after_ms, "rate limited, event dropped");
        }
    }
}

fn log_route_error(user_id: i64, connection_id: u64, err: &RouteError) {
    if err.is_persistence() {
        tracing::warn!(user_id, connection_id, error = %err, "gateway: event failed");
    } else {
        tracing::debug!(user_id, connection_id, error = %err, "gateway: event refused");
    }
}
