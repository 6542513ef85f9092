use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::services::message_service::{MessageDto, MessageService};
use crate::services::user_service::UserService;
use crate::state::AppState;
use crate::websocket::broadcast;
use crate::websocket::protocol::MessagePayload;

pub async fn list_messages(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageDto>>, AppError> {
    let messages =
        MessageService::list_for_conversation(&state.db, conversation_id, user.id).await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub conversation: Uuid,
    pub content: String,
}

/// REST message send. Same path as the WebSocket handler: persist, then fan
/// out to the conversation room and the side channel.
pub async fn create_message(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageDto>), AppError> {
    let sender = UserService::get_summary(&state.db, user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let message =
        MessageService::create_message(&state.db, body.conversation, user.id, &body.content)
            .await?;

    broadcast::dispatch_new_message(
        &state,
        MessagePayload {
            id: message.id,
            conversation: message.conversation_id,
            sender: sender.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
            is_read: false,
        },
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(MessageDto {
            id: message.id,
            conversation: message.conversation_id,
            sender,
            content: message.content,
            is_read: message.is_read,
            is_edited: message.is_edited,
            created_at: message.created_at,
            edited_at: message.edited_at,
            read_at: message.read_at,
        }),
    ))
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let unread_count = MessageService::unread_total(&state.db, user.id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}
