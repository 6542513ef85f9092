use crate::error::AppError;
use crate::models::{User, UserSummary};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

pub struct UserService;

impl UserService {
    pub async fn get(db: &Pool<Postgres>, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, full_name, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Resolve a verified token subject to its identity summary. A subject
    /// with no matching row is treated as unknown, not as an error.
    pub async fn get_summary(db: &Pool<Postgres>, id: Uuid) -> Result<Option<UserSummary>, AppError> {
        Ok(Self::get(db, id).await?.map(UserSummary::from))
    }

    pub async fn exists(db: &Pool<Postgres>, id: Uuid) -> Result<bool, AppError> {
        let rec = sqlx::query_scalar::<_, i32>("SELECT 1 FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(rec.is_some())
    }
}
