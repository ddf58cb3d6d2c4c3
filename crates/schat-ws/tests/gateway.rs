use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use schat_core::auth::{create_token, encode_claims, Claims};
use schat_core::{AppConfig, AppState};
use schat_models::message::MessageStatus;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "gateway-integration-secret-0123456789ab";
const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    ann: i64,
    ben: i64,
    chat_id: i64,
}

impl TestServer {
    async fn start() -> Result<Self> {
        Self::start_with(AppConfig::new(SECRET)).await
    }

    async fn start_with(config: AppConfig) -> Result<Self> {
        let pool = schat_db::create_pool("sqlite::memory:", 1).await?;
        schat_db::run_migrations(&pool).await?;
        let ann =
            schat_db::users::create_user(&pool, "ann@example.com", "h", "Ann", "SCHAT_ANN000")
                .await?;
        let ben =
            schat_db::users::create_user(&pool, "ben@example.com", "h", "Ben", "SCHAT_BEN000")
                .await?;
        let chat = schat_db::chats::get_or_create_chat(&pool, ann.id, ben.id).await?;

        let state = AppState::new(pool, config);
        let app = schat_ws::gateway_router().with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            ann: ann.id,
            ben: ben.id,
            chat_id: chat.id,
        })
    }

    fn token(&self, user_id: i64) -> Result<String> {
        Ok(create_token(user_id, SECRET, 3600)?)
    }

    async fn connect_raw(&self, token: Option<&str>) -> Result<Client> {
        let url = match token {
            Some(token) => format!("ws://{}/ws?token={}", self.addr, token),
            None => format!("ws://{}/ws", self.addr),
        };
        let (client, _) = connect_async(url).await?;
        Ok(client)
    }

    async fn connect_as(&self, user_id: i64) -> Result<Client> {
        let token = self.token(user_id)?;
        let mut client = self.connect_raw(Some(&token)).await?;
        let first = next_event(&mut client).await?;
        assert_eq!(first["type"], "auth_success");
        Ok(client)
    }

    async fn status_of(&self, message_id: i64) -> Result<MessageStatus> {
        let message = self
            .state
            .store
            .get_message(message_id)
            .await?
            .context("message missing")?;
        Ok(message.status)
    }

    async fn wait_for_status(&self, message_id: i64, status: MessageStatus) -> Result<()> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if self.status_of(message_id).await? == status {
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                bail!("message {message_id} never reached {status}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn wait_until_offline(&self, user_id: i64) -> Result<()> {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.state.presence.is_online(user_id) || self.state.registry.is_registered(user_id)
        {
            if tokio::time::Instant::now() > deadline {
                bail!("user {user_id} still online");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }
}

async fn send_json(client: &mut Client, value: Value) -> Result<()> {
    client.send(WsMessage::Text(value.to_string().into())).await?;
    Ok(())
}

async fn next_event(client: &mut Client) -> Result<Value> {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .context("timed out waiting for a frame")?
            .context("connection ended")??;
        match frame {
            WsMessage::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            WsMessage::Close(frame) => bail!("connection closed: {frame:?}"),
            _ => continue,
        }
    }
}

/// Read until the server closes; returns the close code.
async fn expect_close(client: &mut Client) -> Result<u16> {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .context("timed out waiting for close")?;
        match frame {
            Some(Ok(WsMessage::Close(Some(frame)))) => return Ok(u16::from(frame.code)),
            Some(Ok(WsMessage::Close(None))) | None => return Ok(1005),
            Some(Ok(WsMessage::Text(text))) => bail!("unexpected frame before close: {text}"),
            Some(Ok(_)) => continue,
            Some(Err(err)) => bail!("socket error before close: {err}"),
        }
    }
}

async fn expect_silence(client: &mut Client) -> Result<()> {
    match tokio::time::timeout(Duration::from_millis(300), client.next()).await {
        Err(_) => Ok(()),
        Ok(Some(Ok(WsMessage::Ping(_)))) | Ok(Some(Ok(WsMessage::Pong(_)))) => Ok(()),
        Ok(other) => bail!("expected no frames, got {other:?}"),
    }
}

#[tokio::test]
async fn message_between_connected_users_is_delivered() -> Result<()> {
    let server = TestServer::start().await?;
    let mut ann = server.connect_as(server.ann).await?;
    let mut ben = server.connect_as(server.ben).await?;

    send_json(
        &mut ann,
        json!({ "type": "send_message", "chatId": server.chat_id, "content": "hi" }),
    )
    .await?;

    let ack = next_event(&mut ann).await?;
    assert_eq!(ack["type"], "message_sent");
    assert_eq!(ack["message"]["content"], "hi");
    assert_eq!(ack["message"]["status"], "sent");
    assert_eq!(ack["message"]["sender"]["schatId"], "SCHAT_ANN000");

    let pushed = next_event(&mut ben).await?;
    assert_eq!(pushed["type"], "new_message");
    assert_eq!(pushed["message"]["content"], "hi");
    assert_eq!(pushed["message"]["chatId"], server.chat_id);

    let message_id = ack["message"]["id"].as_i64().context("message id")?;
    server
        .wait_for_status(message_id, MessageStatus::Delivered)
        .await?;

    expect_silence(&mut ann).await?;
    expect_silence(&mut ben).await?;
    Ok(())
}

#[tokio::test]
async fn offline_recipient_is_not_pushed_later() -> Result<()> {
    let server = TestServer::start().await?;
    let mut ann = server.connect_as(server.ann).await?;

    send_json(
        &mut ann,
        json!({ "type": "send_message", "chatId": server.chat_id, "content": "later" }),
    )
    .await?;
    let ack = next_event(&mut ann).await?;
    assert_eq!(ack["type"], "message_sent");
    let message_id = ack["message"]["id"].as_i64().context("message id")?;
    assert_eq!(server.status_of(message_id).await?, MessageStatus::Sent);

    send_json(
        &mut ann,
        json!({ "type": "typing", "chatId": server.chat_id, "isTyping": true }),
    )
    .await?;
    expect_silence(&mut ann).await?;

    let mut ben = server.connect_as(server.ben).await?;
    expect_silence(&mut ben).await?;
    assert_eq!(server.status_of(message_id).await?, MessageStatus::Sent);
    Ok(())
}

#[tokio::test]
async fn auth_event_admits_and_earlier_events_are_dropped() -> Result<()> {
    let server = TestServer::start().await?;
    let mut ben = server.connect_as(server.ben).await?;
    let mut ann = server.connect_raw(None).await?;

    send_json(
        &mut ann,
        json!({ "type": "typing", "chatId": server.chat_id, "isTyping": true }),
    )
    .await?;
    expect_silence(&mut ben).await?;

    let token = server.token(server.ann)?;
    send_json(&mut ann, json!({ "type": "auth", "token": token })).await?;
    assert_eq!(next_event(&mut ann).await?["type"], "auth_success");

    send_json(&mut ann, json!({ "type": "auth", "token": token })).await?;
    expect_silence(&mut ann).await?;
    assert!(server.state.presence.is_online(server.ann));

    send_json(
        &mut ann,
        json!({ "type": "typing", "chatId": server.chat_id, "isTyping": true }),
    )
    .await?;
    let typing = next_event(&mut ben).await?;
    assert_eq!(
        typing,
        json!({ "type": "typing_status", "chatId": server.chat_id, "userId": server.ann, "isTyping": true })
    );
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected_and_closed() -> Result<()> {
    let server = TestServer::start().await?;
    let now = chrono::Utc::now().timestamp() as usize;
    let expired = encode_claims(
        &Claims {
            sub: server.ann,
            iat: now - 7200,
            exp: now - 3600,
        },
        SECRET,
    )?;

    let mut client = server.connect_raw(Some(&expired)).await?;
    let event = next_event(&mut client).await?;
    assert_eq!(event, json!({ "type": "auth_error", "message": "Token expired" }));
    assert_eq!(expect_close(&mut client).await?, 1008);
    assert!(server.state.registry.is_empty());
    assert!(!server.state.presence.is_online(server.ann));
    Ok(())
}

#[tokio::test]
async fn invalid_auth_event_is_rejected() -> Result<()> {
    let server = TestServer::start().await?;
    let mut client = server.connect_raw(None).await?;
    send_json(&mut client, json!({ "type": "auth", "token": "forged" })).await?;
    let event = next_event(&mut client).await?;
    assert_eq!(event, json!({ "type": "auth_error", "message": "Invalid token" }));
    assert_eq!(expect_close(&mut client).await?, 1008);
    Ok(())
}

#[tokio::test]
async fn silent_connection_is_closed_after_grace_period() -> Result<()> {
    let mut config = AppConfig::new(SECRET);
    config.gateway.auth_grace_seconds = 1;
    let server = TestServer::start_with(config).await?;

    let mut client = server.connect_raw(None).await?;
    let event = next_event(&mut client).await?;
    assert_eq!(event["type"], "auth_error");
    assert_eq!(event["message"], "Authentication timeout");
    assert_eq!(expect_close(&mut client).await?, 1008);
    Ok(())
}

#[tokio::test]
async fn newer_session_displaces_older_one() -> Result<()> {
    let server = TestServer::start().await?;
    let mut first = server.connect_as(server.ann).await?;
    let mut second = server.connect_as(server.ann).await?;

    assert_eq!(expect_close(&mut first).await?, 4001);

    // The displaced connection's cleanup must not evict the new session.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.state.registry.is_registered(server.ann));
    assert!(server.state.presence.is_online(server.ann));

    let mut ben = server.connect_as(server.ben).await?;
    send_json(
        &mut ben,
        json!({ "type": "send_message", "chatId": server.chat_id, "content": "still there?" }),
    )
    .await?;
    assert_eq!(next_event(&mut ben).await?["type"], "message_sent");
    assert_eq!(next_event(&mut second).await?["type"], "new_message");
    Ok(())
}

#[tokio::test]
async fn closing_connection_flips_presence_offline() -> Result<()> {
    let server = TestServer::start().await?;
    let before = chrono::Utc::now();
    let mut ann = server.connect_as(server.ann).await?;
    assert!(server.state.presence.is_online(server.ann));

    ann.close(None).await?;
    server.wait_until_offline(server.ann).await?;

    let presence = server
        .state
        .presence
        .get(server.ann)
        .context("presence recorded")?;
    assert!(presence.last_seen >= before);
    let row = schat_db::users::get_user_by_id(&server.state.db, server.ann)
        .await?
        .context("user row")?;
    assert!(!row.is_online);
    Ok(())
}

#[tokio::test]
async fn read_receipt_reaches_sender_once() -> Result<()> {
    let server = TestServer::start().await?;
    let mut ann = server.connect_as(server.ann).await?;
    let mut ben = server.connect_as(server.ben).await?;

    send_json(
        &mut ann,
        json!({ "type": "send_message", "chatId": server.chat_id, "content": "read me" }),
    )
    .await?;
    let ack = next_event(&mut ann).await?;
    let message_id = ack["message"]["id"].as_i64().context("message id")?;
    assert_eq!(next_event(&mut ben).await?["type"], "new_message");

    send_json(&mut ben, json!({ "type": "mark_read", "messageId": message_id })).await?;
    let receipt = next_event(&mut ann).await?;
    assert_eq!(
        receipt,
        json!({ "type": "message_read", "messageId": message_id, "chatId": server.chat_id, "readBy": server.ben })
    );

    send_json(&mut ben, json!({ "type": "mark_read", "messageId": message_id })).await?;
    expect_silence(&mut ann).await?;
    assert_eq!(server.status_of(message_id).await?, MessageStatus::Read);
    Ok(())
}

#[tokio::test]
async fn bad_frames_do_not_close_the_connection() -> Result<()> {
    let server = TestServer::start().await?;
    let mut ann = server.connect_as(server.ann).await?;

    ann.send(WsMessage::Text("not json".to_string().into())).await?;
    send_json(&mut ann, json!({ "type": "start_call", "chatId": server.chat_id })).await?;
    send_json(&mut ann, json!({ "type": "send_message", "chatId": "x" })).await?;
    expect_silence(&mut ann).await?;

    send_json(
        &mut ann,
        json!({ "type": "send_message", "chatId": server.chat_id, "content": "ok" }),
    )
    .await?;
    assert_eq!(next_event(&mut ann).await?["type"], "message_sent");
    Ok(())
}

#[tokio::test]
async fn storage_failure_sends_no_ack_and_keeps_connection() -> Result<()> {
    let server = TestServer::start().await?;
    let mut ann = server.connect_as(server.ann).await?;
    let mut ben = server.connect_as(server.ben).await?;

    sqlx::query(
        "CREATE TRIGGER refuse_messages BEFORE INSERT ON messages
         BEGIN SELECT RAISE(ABORT, 'messages refused'); END",
    )
    .execute(&server.state.db)
    .await?;
    send_json(
        &mut ann,
        json!({ "type": "send_message", "chatId": server.chat_id, "content": "lost" }),
    )
    .await?;
    expect_silence(&mut ann).await?;
    expect_silence(&mut ben).await?;

    sqlx::query("DROP TRIGGER refuse_messages")
        .execute(&server.state.db)
        .await?;
    send_json(
        &mut ann,
        json!({ "type": "send_message", "chatId": server.chat_id, "content": "kept" }),
    )
    .await?;
    let ack = next_event(&mut ann).await?;
    assert_eq!(ack["type"], "message_sent");
    assert_eq!(ack["message"]["content"], "kept");
    assert_eq!(next_event(&mut ben).await?["message"]["content"], "kept");
    Ok(())
}
