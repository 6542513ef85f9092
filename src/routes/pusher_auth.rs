use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::{Participant, User};
use crate::services::conversation_service::ConversationService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PusherAuthRequest {
    pub channel_name: String,
    pub socket_id: String,
}

#[derive(Serialize)]
pub struct PusherAuthResponse {
    pub auth: String,
}

/// Authorize a client for a private side-channel conversation channel.
/// Only participants of the underlying conversation get a signature.
pub async fn pusher_auth(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<PusherAuthRequest>,
) -> Result<Json<PusherAuthResponse>, AppError> {
    let Some(pusher) = state.pusher.as_ref() else {
        return Err(AppError::NotFound);
    };

    let conversation_id = body
        .channel_name
        .strip_prefix("private-conversation-")
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::BadRequest("invalid channel name".into()))?;

    if ConversationService::get(&state.db, conversation_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound);
    }
    Participant::verify(&state.db, user.id, conversation_id).await?;

    Ok(Json(PusherAuthResponse {
        auth: pusher.authenticate_channel(&body.socket_id, &body.channel_name),
    }))
}
