use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::services::conversation_service::{ConversationService, ConversationSummary};
use crate::services::user_service::UserService;
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let conversations = ConversationService::list_for_user(&state.db, user.id).await?;
    Ok(Json(conversations))
}

#[derive(Deserialize)]
pub struct StartConversationRequest {
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
}

/// Start a conversation with a seller, or return the existing one for the
/// same pair (and product, when given). Calling twice with the same inputs
/// yields the same conversation id.
pub async fn start_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<StartConversationRequest>,
) -> Result<(StatusCode, Json<ConversationSummary>), AppError> {
    if body.seller_id == user.id {
        return Err(AppError::BadRequest(
            "cannot start a conversation with yourself".into(),
        ));
    }
    if !UserService::exists(&state.db, body.seller_id).await? {
        return Err(AppError::NotFound);
    }

    let (conversation, created) =
        ConversationService::get_or_create(&state.db, user.id, body.seller_id, body.product_id)
            .await?;
    let summary = ConversationService::summary(&state.db, conversation.id, user.id).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

/// Bulk mark-read for everything addressed to the caller in a conversation.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ConversationService::mark_conversation_read(&state.db, conversation_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
