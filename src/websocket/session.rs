//! Per-connection session: identity, current conversation room, and the
//! outbound event pump. One session per accepted socket, never reused.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use super::broadcast;
use super::protocol::{ClientFrame, MessagePayload, ServerEvent};
use super::RoomKey;
use crate::error::AppError;
use crate::models::UserSummary;
use crate::services::{conversation_service::ConversationService, message_service::MessageService};
use crate::state::AppState;

struct Session {
    id: Uuid,
    user: UserSummary,
    // At most one conversation room at a time; joining a new one leaves the
    // previous one first.
    conversation_room: Option<Uuid>,
    tx: UnboundedSender<ServerEvent>,
}

impl Session {
    /// Queue an event for this session only. Send failure means the pump is
    /// gone and the select loop is about to exit anyway.
    fn emit(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    async fn handle_text(&mut self, state: &AppState, text: &str) {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(_) => {
                self.emit(ServerEvent::error("invalid message frame"));
                return;
            }
        };
        match frame {
            ClientFrame::JoinConversation { conversation_id } => {
                self.join_conversation(state, conversation_id).await
            }
            ClientFrame::LeaveConversation => self.leave_conversation(state).await,
            ClientFrame::SendMessage {
                conversation_id,
                content,
            } => self.send_message(state, conversation_id, content).await,
            ClientFrame::Typing { is_typing } => self.typing(state, is_typing).await,
            ClientFrame::MarkRead { message_id } => self.mark_read(state, message_id).await,
        }
    }

    async fn join_conversation(&mut self, state: &AppState, conversation_id: Option<Uuid>) {
        let Some(conversation_id) = conversation_id else {
            self.emit(ServerEvent::error("conversation_id not provided"));
            return;
        };
        match ConversationService::is_participant(&state.db, conversation_id, self.user.id).await {
            Ok(true) => {}
            Ok(false) => {
                self.emit(ServerEvent::error("not authorized for this conversation"));
                return;
            }
            Err(e) => {
                warn!(error = %e, %conversation_id, "participant check failed");
                self.emit(ServerEvent::error("could not join conversation"));
                return;
            }
        }

        // Implicitly leave any previously held room.
        self.leave_conversation(state).await;
        state
            .registry
            .join(
                RoomKey::Conversation(conversation_id),
                self.id,
                self.tx.clone(),
            )
            .await;
        self.conversation_room = Some(conversation_id);
        self.emit(ServerEvent::JoinedConversation { conversation_id });
    }

    /// Always succeeds; leaving with no room held is a no-op.
    async fn leave_conversation(&mut self, state: &AppState) {
        if let Some(previous) = self.conversation_room.take() {
            state
                .registry
                .leave(RoomKey::Conversation(previous), self.id)
                .await;
        }
    }

    /// Sending does not require a prior join: an explicit conversation id
    /// with a passing participant check is enough.
    async fn send_message(
        &mut self,
        state: &AppState,
        conversation_id: Option<Uuid>,
        content: Option<String>,
    ) {
        let content = content.filter(|c| !c.trim().is_empty());
        let (Some(conversation_id), Some(content)) = (conversation_id, content) else {
            self.emit(ServerEvent::error("missing conversation_id or content"));
            return;
        };

        match MessageService::create_message(&state.db, conversation_id, self.user.id, &content)
            .await
        {
            Ok(message) => {
                let payload = MessagePayload {
                    id: message.id,
                    conversation: message.conversation_id,
                    sender: self.user.clone(),
                    content: message.content,
                    created_at: message.created_at,
                    is_read: false,
                };
                broadcast::dispatch_new_message(state, payload).await;
            }
            Err(AppError::Forbidden) => {
                self.emit(ServerEvent::error("not authorized for this conversation"));
            }
            Err(AppError::BadRequest(message)) => {
                self.emit(ServerEvent::error(message));
            }
            Err(e) => {
                // Persistence failed: no broadcast may go out for a message
                // that does not exist.
                warn!(error = %e, %conversation_id, "message persist failed");
                self.emit(ServerEvent::error("message not sent"));
            }
        }
    }

    async fn typing(&self, state: &AppState, is_typing: bool) {
        // Only meaningful while a conversation room is held.
        let Some(conversation_id) = self.conversation_room else {
            return;
        };
        broadcast::dispatch_typing(state, conversation_id, self.user.clone(), is_typing).await;
    }

    async fn mark_read(&self, state: &AppState, message_id: Option<Uuid>) {
        let Some(message_id) = message_id else {
            self.emit(ServerEvent::error("message_id not provided"));
            return;
        };
        match MessageService::mark_read(&state.db, message_id, self.user.id).await {
            Ok(receipt) => {
                if let Some(recipient) = receipt.recipient {
                    broadcast::dispatch_read_receipt(
                        state,
                        recipient,
                        receipt.message_id,
                        receipt.conversation_id,
                    )
                    .await;
                }
            }
            Err(AppError::NotFound) => {
                self.emit(ServerEvent::error("message not found"));
            }
            Err(AppError::Forbidden) => {
                self.emit(ServerEvent::error("not authorized to mark this message read"));
            }
            Err(e) => {
                warn!(error = %e, %message_id, "mark read failed");
                self.emit(ServerEvent::error("could not mark message read"));
            }
        }
    }
}

/// Drive one authenticated connection until it closes.
pub async fn run(state: AppState, user: UserSummary, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel();
    let mut session = Session {
        id: Uuid::new_v4(),
        user,
        conversation_room: None,
        tx,
    };

    state
        .registry
        .join(
            RoomKey::User(session.user.id),
            session.id,
            session.tx.clone(),
        )
        .await;
    debug!(user_id = %session.user.id, session_id = %session.id, "websocket session started");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(event) => {
                        if event.suppressed_for(session.user.id) {
                            continue;
                        }
                        let text = match serde_json::to_string(&event) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "failed to serialize outbound event");
                                continue;
                            }
                        };
                        if sink.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => session.handle_text(&state, &text).await,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Ping/pong is answered by the framework.
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Every exit path above falls through here, so an abnormal disconnect
    // can never leave a stale room subscription behind.
    if let Some(conversation_id) = session.conversation_room.take() {
        state
            .registry
            .leave(RoomKey::Conversation(conversation_id), session.id)
            .await;
    }
    state
        .registry
        .leave(RoomKey::User(session.user.id), session.id)
        .await;
    debug!(user_id = %session.user.id, session_id = %session.id, "websocket session closed");
}
