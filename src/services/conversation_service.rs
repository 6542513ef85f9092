use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::conversation::Conversation;
use crate::models::UserSummary;

#[derive(Debug, Serialize)]
pub struct LastMessage {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender_id: Uuid,
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub participants: Vec<UserSummary>,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ConversationService;

impl ConversationService {
    /// Find the conversation between two users (optionally scoped to a
    /// product) or create it. Creation inserts the conversation row and both
    /// participant rows in one transaction, so a lookup never observes a
    /// half-created participant set.
    pub async fn get_or_create(
        db: &Pool<Postgres>,
        user_a: Uuid,
        user_b: Uuid,
        product_id: Option<Uuid>,
    ) -> Result<(Conversation, bool), AppError> {
        let existing = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT c.id, c.product_id, c.created_at, c.updated_at
            FROM conversations c
            JOIN conversation_participants pa
              ON pa.conversation_id = c.id AND pa.user_id = $1
            JOIN conversation_participants pb
              ON pb.conversation_id = c.id AND pb.user_id = $2
            WHERE $3::uuid IS NULL OR c.product_id = $3
            ORDER BY c.updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(product_id)
        .fetch_optional(db)
        .await?;

        if let Some(conversation) = existing {
            return Ok((conversation, false));
        }

        let id = Uuid::new_v4();
        let mut tx = db.begin().await?;
        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (id, product_id) VALUES ($1, $2) \
             RETURNING id, product_id, created_at, updated_at",
        )
        .bind(id)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id) \
             VALUES ($1, $2), ($1, $3) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(user_a)
        .bind(user_b)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok((conversation, true))
    }

    pub async fn get(db: &Pool<Postgres>, id: Uuid) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, product_id, created_at, updated_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(conversation)
    }

    pub async fn is_participant(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        let rec = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(rec.is_some())
    }

    /// The conversation's non-acting participant. With the two-party
    /// marketplace flow this is always the single other user.
    pub async fn other_participant(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Uuid>, AppError> {
        let other = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM conversation_participants \
             WHERE conversation_id = $1 AND user_id <> $2 \
             ORDER BY joined_at ASC LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(other)
    }

    /// All conversations the user participates in, most recently active
    /// first, with participant summaries, the last message and the caller's
    /// unread count.
    pub async fn list_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT c.id, c.product_id, c.created_at, c.updated_at
            FROM conversations c
            JOIN conversation_participants cp ON cp.conversation_id = c.id
            WHERE cp.user_id = $1
            ORDER BY c.updated_at DESC
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Self::build_summaries(db, conversations, user_id).await
    }

    /// Summary of a single conversation, from the caller's point of view.
    pub async fn summary(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationSummary, AppError> {
        let conversation = Self::get(db, conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let mut summaries = Self::build_summaries(db, vec![conversation], user_id).await?;
        summaries.pop().ok_or(AppError::Internal)
    }

    async fn build_summaries(
        db: &Pool<Postgres>,
        conversations: Vec<Conversation>,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        if conversations.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();

        let participant_rows = sqlx::query(
            r#"
            SELECT cp.conversation_id, u.id, u.username, u.full_name
            FROM conversation_participants cp
            JOIN users u ON u.id = cp.user_id
            WHERE cp.conversation_id = ANY($1)
            ORDER BY cp.joined_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(db)
        .await?;

        let mut participants: HashMap<Uuid, Vec<UserSummary>> = HashMap::new();
        for row in participant_rows {
            let conversation_id: Uuid = row.get("conversation_id");
            participants
                .entry(conversation_id)
                .or_default()
                .push(UserSummary {
                    id: row.get("id"),
                    username: row.get("username"),
                    name: row.get("full_name"),
                });
        }

        let last_rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (conversation_id)
                   conversation_id, id, content, created_at, sender_id, is_read
            FROM messages
            WHERE conversation_id = ANY($1)
            ORDER BY conversation_id, created_at DESC
            "#,
        )
        .bind(&ids)
        .fetch_all(db)
        .await?;

        let mut last_messages: HashMap<Uuid, LastMessage> = HashMap::new();
        for row in last_rows {
            let conversation_id: Uuid = row.get("conversation_id");
            last_messages.insert(
                conversation_id,
                LastMessage {
                    id: row.get("id"),
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                    sender_id: row.get("sender_id"),
                    is_read: row.get("is_read"),
                },
            );
        }

        let unread_rows = sqlx::query(
            r#"
            SELECT conversation_id, COUNT(*)::bigint AS unread
            FROM messages
            WHERE conversation_id = ANY($1)
              AND NOT is_read
              AND sender_id <> $2
            GROUP BY conversation_id
            "#,
        )
        .bind(&ids)
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let mut unread: HashMap<Uuid, i64> = HashMap::new();
        for row in unread_rows {
            let conversation_id: Uuid = row.get("conversation_id");
            unread.insert(conversation_id, row.get("unread"));
        }

        Ok(conversations
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id,
                product_id: c.product_id,
                participants: participants.remove(&c.id).unwrap_or_default(),
                last_message: last_messages.remove(&c.id),
                unread_count: unread.remove(&c.id).unwrap_or(0),
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
            .collect())
    }

    /// Bulk-read every unread message the caller did not send.
    pub async fn mark_conversation_read(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, AppError> {
        if !Self::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::Forbidden);
        }

        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = NOW() \
             WHERE conversation_id = $1 AND NOT is_read AND sender_id <> $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }
}
