//! Routes domain events to the right rooms, and mirrors new messages to the
//! external side channel. Order is always persist, then broadcast, then
//! mirror.

use tracing::warn;
use uuid::Uuid;

use super::protocol::{MessagePayload, ServerEvent};
use super::RoomKey;
use crate::models::UserSummary;
use crate::services::pusher::channel_for_conversation;
use crate::state::AppState;

/// Fan a freshly persisted message out to the conversation room, then mirror
/// it to the Pusher channel for clients without an open room subscription.
pub async fn dispatch_new_message(state: &AppState, message: MessagePayload) {
    let conversation_id = message.conversation;
    let event = ServerEvent::NewMessage { message };
    state
        .registry
        .broadcast(RoomKey::Conversation(conversation_id), event.clone())
        .await;
    mirror_to_side_channel(state, conversation_id, &event).await;
}

/// Typing is ephemeral: conversation room only, nothing persisted. Receivers
/// drop their own indicator (`ServerEvent::suppressed_for`).
pub async fn dispatch_typing(
    state: &AppState,
    conversation_id: Uuid,
    user: UserSummary,
    is_typing: bool,
) {
    state
        .registry
        .broadcast(
            RoomKey::Conversation(conversation_id),
            ServerEvent::TypingIndicator { user, is_typing },
        )
        .await;
}

/// Receipts are one-to-one: they go to the original sender's personal room,
/// not to the conversation room.
pub async fn dispatch_read_receipt(
    state: &AppState,
    recipient: Uuid,
    message_id: Uuid,
    conversation_id: Uuid,
) {
    state
        .registry
        .broadcast(
            RoomKey::User(recipient),
            ServerEvent::MessageReadReceipt {
                message_id,
                conversation_id,
            },
        )
        .await;
}

/// At-most-once side-channel publish. Failures are logged, never retried and
/// never surfaced to the sender: the direct broadcast already went out.
async fn mirror_to_side_channel(state: &AppState, conversation_id: Uuid, event: &ServerEvent) {
    let Some(pusher) = state.pusher.as_ref() else {
        return;
    };
    let ServerEvent::NewMessage { message } = event else {
        return;
    };
    let payload = match serde_json::to_value(message) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "failed to serialize side-channel payload");
            return;
        }
    };
    if let Err(e) = pusher
        .trigger(
            &channel_for_conversation(conversation_id),
            "new-message",
            &payload,
        )
        .await
    {
        warn!(%conversation_id, error = %e, "side-channel publish failed");
    }
}
