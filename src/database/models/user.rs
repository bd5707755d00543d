use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::UserId;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub created_at: String,
}

impl UserProfile {
    /// Creates the profile on first contact, refreshing names afterwards.
    pub async fn upsert(
        pool: &SqlitePool,
        id: UserId,
        username: Option<String>,
        full_name: Option<String>,
        created_at: String,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, full_name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET username = excluded.username, full_name = excluded.full_name
            "#
        )
        .bind(id)
        .bind(&username)
        .bind(&full_name)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: UserId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            "SELECT id, username, full_name, created_at FROM users WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}
