//! Authorization guards that enforce permission checks at the type level

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::conversation_service::ConversationService;

/// Represents an authenticated user extracted from the bearer token
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the auth middleware
        let user_id = parts
            .extensions
            .get::<Uuid>()
            .cloned()
            .ok_or(AppError::Unauthorized)?;

        Ok(User { id: user_id })
    }
}

/// Proof that a user belongs to a conversation, for handlers whose service
/// call does not perform the membership check itself.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
}

impl Participant {
    pub async fn verify(
        db: &PgPool,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        if !ConversationService::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::Forbidden);
        }
        Ok(Participant {
            user_id,
            conversation_id,
        })
    }
}
