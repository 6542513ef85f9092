//! End-to-end WebSocket session tests: real server, real Postgres, two
//! connected clients.
//!
//! Run with a database available:
//!   DATABASE_URL=postgres://... cargo test -- --ignored

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use marketplace_chat_service::config::Config;
use marketplace_chat_service::db::MIGRATOR;
use marketplace_chat_service::middleware::auth::Claims;
use marketplace_chat_service::routes;
use marketplace_chat_service::services::conversation_service::ConversationService;
use marketplace_chat_service::state::AppState;
use marketplace_chat_service::websocket::RoomRegistry;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const JWT_SECRET: &str = "ws-session-test-secret";

async fn spawn_server() -> (SocketAddr, Pool<Postgres>) {
    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL env var required for tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .expect("failed to connect to DATABASE_URL");
    MIGRATOR.run(&pool).await.expect("migrations failed");

    let mut config = Config::test_defaults();
    config.jwt_secret = JWT_SECRET.into();
    let state = AppState {
        db: pool.clone(),
        registry: RoomRegistry::new(),
        pusher: None,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, routes::build_router(state))
            .await
            .expect("server crashed");
    });

    (addr, pool)
}

fn mint_token(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token encoding failed")
}

async fn seed_user(pool: &Pool<Postgres>, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, full_name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("{}-{}", name, id))
        .bind(name)
        .execute(pool)
        .await
        .expect("failed to seed user");
    id
}

async fn connect(addr: SocketAddr, user_id: Uuid) -> WsClient {
    let url = format!("ws://{}/api/v1/ws?token={}", addr, mint_token(user_id));
    let (socket, _) = connect_async(url).await.expect("ws handshake failed");
    socket
}

async fn send_frame(ws: &mut WsClient, frame: serde_json::Value) {
    ws.send(WsMessage::Text(frame.to_string()))
        .await
        .expect("ws send failed");
}

/// Next JSON event from the server, failing the test after five seconds.
async fn next_event(ws: &mut WsClient) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for ws event")
        .expect("ws stream closed")
        .expect("ws stream errored");
    match msg {
        WsMessage::Text(text) => serde_json::from_str(&text).expect("non-json ws event"),
        other => panic!("unexpected ws message: {other:?}"),
    }
}

async fn join_conversation(ws: &mut WsClient, conversation_id: Uuid) {
    send_frame(
        ws,
        serde_json::json!({ "type": "join_conversation", "conversation_id": conversation_id }),
    )
    .await;
    let event = next_event(ws).await;
    assert_eq!(event["type"], "joined_conversation");
    assert_eq!(event["conversation_id"], conversation_id.to_string());
}

#[tokio::test]
#[ignore]
async fn handshake_rejects_missing_and_invalid_tokens() {
    let (addr, _pool) = spawn_server().await;

    let bare = format!("ws://{}/api/v1/ws", addr);
    assert!(connect_async(bare).await.is_err());

    let garbage = format!("ws://{}/api/v1/ws?token=not-a-jwt", addr);
    assert!(connect_async(garbage).await.is_err());

    // Well-signed token for a user that does not exist.
    let ghost = format!("ws://{}/api/v1/ws?token={}", addr, mint_token(Uuid::new_v4()));
    assert!(connect_async(ghost).await.is_err());
}

#[tokio::test]
#[ignore]
async fn joined_clients_receive_each_others_messages() {
    let (addr, pool) = spawn_server().await;
    let alice = seed_user(&pool, "alice").await;
    let bob = seed_user(&pool, "bob").await;
    let (conversation, _) = ConversationService::get_or_create(&pool, alice, bob, None)
        .await
        .expect("conversation start failed");

    let mut alice_ws = connect(addr, alice).await;
    let mut bob_ws = connect(addr, bob).await;
    join_conversation(&mut alice_ws, conversation.id).await;
    join_conversation(&mut bob_ws, conversation.id).await;

    send_frame(
        &mut alice_ws,
        serde_json::json!({
            "type": "send_message",
            "conversation_id": conversation.id,
            "content": "is the bike still available?"
        }),
    )
    .await;

    for ws in [&mut alice_ws, &mut bob_ws] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["message"]["content"], "is the bike still available?");
        assert_eq!(event["message"]["sender"]["id"], alice.to_string());
        assert_eq!(event["message"]["is_read"], false);
    }
}

#[tokio::test]
#[ignore]
async fn typing_indicator_reaches_only_the_other_identity() {
    let (addr, pool) = spawn_server().await;
    let alice = seed_user(&pool, "alice").await;
    let bob = seed_user(&pool, "bob").await;
    let (conversation, _) = ConversationService::get_or_create(&pool, alice, bob, None)
        .await
        .expect("conversation start failed");

    // Alice holds two live sessions; the filter is per identity, so neither
    // may see her indicator.
    let mut alice_ws = connect(addr, alice).await;
    let mut alice_phone_ws = connect(addr, alice).await;
    let mut bob_ws = connect(addr, bob).await;
    join_conversation(&mut alice_ws, conversation.id).await;
    join_conversation(&mut alice_phone_ws, conversation.id).await;
    join_conversation(&mut bob_ws, conversation.id).await;

    send_frame(
        &mut alice_ws,
        serde_json::json!({ "type": "typing", "is_typing": true }),
    )
    .await;

    let event = next_event(&mut bob_ws).await;
    assert_eq!(event["type"], "typing_indicator");
    assert_eq!(event["user"]["id"], alice.to_string());
    assert_eq!(event["is_typing"], true);

    // Neither of Alice's sessions sees her own indicator. The next event
    // each receives after she sends a message must be that message, not the
    // indicator.
    send_frame(
        &mut alice_ws,
        serde_json::json!({
            "type": "send_message",
            "conversation_id": conversation.id,
            "content": "typing done"
        }),
    )
    .await;
    for ws in [&mut alice_ws, &mut alice_phone_ws] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["message"]["content"], "typing done");
    }
}

#[tokio::test]
#[ignore]
async fn read_receipt_is_routed_to_the_sender() {
    let (addr, pool) = spawn_server().await;
    let alice = seed_user(&pool, "alice").await;
    let bob = seed_user(&pool, "bob").await;
    let (conversation, _) = ConversationService::get_or_create(&pool, alice, bob, None)
        .await
        .expect("conversation start failed");

    // Alice is connected but has not joined the conversation room; the
    // receipt must reach her through her user room.
    let mut alice_ws = connect(addr, alice).await;
    let mut bob_ws = connect(addr, bob).await;
    join_conversation(&mut bob_ws, conversation.id).await;

    send_frame(
        &mut bob_ws,
        serde_json::json!({
            "type": "send_message",
            "conversation_id": conversation.id,
            "content": "ping"
        }),
    )
    .await;
    let bob_echo = next_event(&mut bob_ws).await;
    assert_eq!(bob_echo["type"], "new_message");

    // Bob now marks Alice's reply read. Seed the reply directly.
    let reply = marketplace_chat_service::services::message_service::MessageService::create_message(
        &pool,
        conversation.id,
        alice,
        "pong",
    )
    .await
    .expect("seed reply failed");

    send_frame(
        &mut bob_ws,
        serde_json::json!({ "type": "mark_read", "message_id": reply.id }),
    )
    .await;

    let event = next_event(&mut alice_ws).await;
    assert_eq!(event["type"], "message_read_receipt");
    assert_eq!(event["message_id"], reply.id.to_string());
    assert_eq!(event["conversation_id"], conversation.id.to_string());
}

#[tokio::test]
#[ignore]
async fn unauthorized_and_malformed_frames_get_error_events() {
    let (addr, pool) = spawn_server().await;
    let alice = seed_user(&pool, "alice").await;
    let mut alice_ws = connect(addr, alice).await;

    send_frame(&mut alice_ws, serde_json::json!({ "type": "dance" })).await;
    let event = next_event(&mut alice_ws).await;
    assert_eq!(event["type"], "error");

    // Joining a conversation alice does not belong to.
    let bob = seed_user(&pool, "bob").await;
    let carol = seed_user(&pool, "carol").await;
    let (private, _) = ConversationService::get_or_create(&pool, bob, carol, None)
        .await
        .expect("conversation start failed");
    send_frame(
        &mut alice_ws,
        serde_json::json!({ "type": "join_conversation", "conversation_id": private.id }),
    )
    .await;
    let event = next_event(&mut alice_ws).await;
    assert_eq!(event["type"], "error");

    // The connection survives both errors.
    send_frame(
        &mut alice_ws,
        serde_json::json!({ "type": "leave_conversation" }),
    )
    .await;
    alice_ws
        .send(WsMessage::Close(None))
        .await
        .expect("close failed");
}
