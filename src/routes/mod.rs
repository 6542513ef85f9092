use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod conversations;
pub mod messages;
pub mod pusher_auth;

use crate::websocket::handlers::ws_handler;
use conversations::{list_conversations, mark_conversation_read, start_conversation};
use messages::{create_message, list_messages, unread_count};
use pusher_auth::pusher_auth;

pub fn build_router(state: AppState) -> Router {
    // Liveness stays public for healthchecks
    let introspection = Router::new().route("/health", get(|| async { "OK" }));

    let api_v1 = Router::new()
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/conversations/start", post(start_conversation))
        .route("/chat/conversations/:id/messages", get(list_messages))
        .route(
            "/chat/conversations/:id/mark-read",
            post(mark_conversation_read),
        )
        .route("/chat/messages/create", post(create_message))
        .route("/chat/messages/unread-count", get(unread_count))
        .route("/pusher/auth", post(pusher_auth))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    // The WS handshake authenticates inside the handler (query parameter);
    // the bearer-header middleware would reject browser clients here.
    let ws = Router::new().route("/ws", get(ws_handler));

    let router = introspection.merge(Router::new().nest("/api/v1", api_v1.merge(ws)));
    crate::middleware::with_defaults(router).with_state(state)
}
