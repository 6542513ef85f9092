use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::Message;
use crate::models::UserSummary;
use crate::services::conversation_service::ConversationService;

#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation: Uuid,
    pub sender: UserSummary,
    pub content: String,
    pub is_read: bool,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Outcome of a successful mark-read: who to notify, and about what.
#[derive(Debug, Clone)]
pub struct ReadReceipt {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub recipient: Option<Uuid>,
}

pub struct MessageService;

impl MessageService {
    /// Persist a message. The insert and the conversation last-activity
    /// touch commit as one transaction, so a failure leaves no partial
    /// message and no phantom activity bump.
    pub async fn create_message(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("message content cannot be empty".into()));
        }
        if !ConversationService::is_participant(db, conversation_id, sender_id).await? {
            return Err(AppError::Forbidden);
        }

        let mut tx = db.begin().await?;
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (id, conversation_id, sender_id, content) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, conversation_id, sender_id, content, is_read, read_at, \
                       is_edited, edited_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(message)
    }

    /// Messages in a conversation, oldest first. Caller must be a
    /// participant.
    pub async fn list_for_conversation(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<MessageDto>, AppError> {
        if !ConversationService::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::Forbidden);
        }

        let rows = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.content, m.is_read, m.is_edited,
                   m.created_at, m.edited_at, m.read_at,
                   u.id AS sender_id, u.username, u.full_name
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = $1
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MessageDto {
                id: r.get("id"),
                conversation: r.get("conversation_id"),
                sender: UserSummary {
                    id: r.get("sender_id"),
                    username: r.get("username"),
                    name: r.get("full_name"),
                },
                content: r.get("content"),
                is_read: r.get("is_read"),
                is_edited: r.get("is_edited"),
                created_at: r.get("created_at"),
                edited_at: r.get("edited_at"),
                read_at: r.get("read_at"),
            })
            .collect())
    }

    /// Mark a single message read on behalf of `actor`.
    ///
    /// Authorization: the actor must be a conversation participant and must
    /// not be the message's sender. The read flag update is idempotent; a
    /// repeat call leaves `read_at` untouched but still reports the receipt.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        message_id: Uuid,
        actor: Uuid,
    ) -> Result<ReadReceipt, AppError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, sender_id, is_read FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;

        let conversation_id: Uuid = row.get("conversation_id");
        let sender_id: Uuid = row.get("sender_id");
        let is_read: bool = row.get("is_read");

        if sender_id == actor {
            // A sender can never be its own read-receipt target.
            return Err(AppError::Forbidden);
        }
        if !ConversationService::is_participant(db, conversation_id, actor).await? {
            return Err(AppError::Forbidden);
        }

        if !is_read {
            sqlx::query(
                "UPDATE messages SET is_read = TRUE, read_at = NOW() \
                 WHERE id = $1 AND NOT is_read",
            )
            .bind(message_id)
            .execute(db)
            .await?;
        }

        let recipient =
            ConversationService::other_participant(db, conversation_id, actor).await?;

        Ok(ReadReceipt {
            message_id,
            conversation_id,
            recipient,
        })
    }

    /// Total unread messages addressed to the user across all conversations.
    pub async fn unread_total(db: &Pool<Postgres>, user_id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)::bigint
            FROM messages m
            JOIN conversation_participants cp
              ON cp.conversation_id = m.conversation_id AND cp.user_id = $1
            WHERE NOT m.is_read AND m.sender_id <> $1
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }
}
