use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::task::decode_timestamp;
use super::{TaskId, UserId};
use crate::utils::datetime::to_storage;

/// Namespace for deterministic reminder ids.
const REMINDER_NAMESPACE: Uuid = Uuid::from_u128(0x5c6f_8a1e_2b7d_4f3a_9e01_d4c2_7b8a_6f10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: UserId,
    pub task_id: TaskId,
    pub fire_at: NaiveDateTime,
    /// Task text at the moment the reminder was created.
    pub task_text: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, FromRow)]
struct ReminderRow {
    id: String,
    user_id: i64,
    task_id: i64,
    fire_at: String,
    task_text: String,
    created_at: String,
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = sqlx::Error;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        Ok(Reminder {
            id: row.id,
            user_id: row.user_id,
            task_id: row.task_id,
            fire_at: decode_timestamp(&row.fire_at)?,
            task_text: row.task_text,
            created_at: decode_timestamp(&row.created_at)?,
        })
    }
}

impl Reminder {
    /// Same owner, task and fire time always give the same id.
    pub fn derive_id(user_id: UserId, task_id: TaskId, fire_at: &NaiveDateTime) -> String {
        let name = format!("{}:{}:{}", user_id, task_id, to_storage(fire_at));
        Uuid::new_v5(&REMINDER_NAMESPACE, name.as_bytes()).to_string()
    }

    /// Inserts the reminder; an existing row with the same id is left untouched.
    pub async fn insert(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO reminders (id, user_id, task_id, fire_at, task_text, created_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&self.id)
        .bind(self.user_id)
        .bind(self.task_id)
        .bind(to_storage(&self.fire_at))
        .bind(&self.task_text)
        .bind(to_storage(&self.created_at))
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_task(
        pool: &SqlitePool,
        user_id: UserId,
        task_id: TaskId,
    ) -> Result<u64, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::delete_for_task_with(&mut conn, user_id, task_id).await
    }

    pub async fn delete_for_task_with(
        conn: &mut SqliteConnection,
        user_id: UserId,
        task_id: TaskId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reminders WHERE user_id = ? AND task_id = ?")
            .bind(user_id)
            .bind(task_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ReminderRow>(
            "SELECT id, user_id, task_id, fire_at, task_text, created_at FROM reminders ORDER BY fire_at"
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Reminder::try_from)
        .collect()
    }

    pub async fn find_by_user(pool: &SqlitePool, user_id: UserId) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ReminderRow>(
            "SELECT id, user_id, task_id, fire_at, task_text, created_at FROM reminders WHERE user_id = ? ORDER BY fire_at"
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Reminder::try_from)
        .collect()
    }

    pub async fn exists(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }
}
