use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use super::{TaskId, UserId};
use crate::utils::datetime::{from_storage, to_storage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub text: String,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub deadline: Option<NaiveDateTime>,
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    user_id: i64,
    text: String,
    completed: bool,
    created_at: String,
    completed_at: Option<String>,
    deadline: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = sqlx::Error;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            user_id: row.user_id,
            text: row.text,
            completed: row.completed,
            created_at: decode_timestamp(&row.created_at)?,
            completed_at: row.completed_at.as_deref().map(decode_timestamp).transpose()?,
            deadline: row.deadline.as_deref().map(decode_timestamp).transpose()?,
        })
    }
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<NaiveDateTime, sqlx::Error> {
    from_storage(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

impl Task {
    /// Flips completion, keeping `completed_at` in step with `completed`.
    pub fn toggled(&self, now: NaiveDateTime) -> Task {
        let completed = !self.completed;
        Task {
            completed,
            completed_at: completed.then_some(now),
            ..self.clone()
        }
    }

    /// Deadline has passed and the task is still open.
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        !self.completed && self.deadline.is_some_and(|deadline| deadline <= now)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        user_id: UserId,
        text: &str,
        created_at: NaiveDateTime,
    ) -> Result<Self, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO tasks (user_id, text, completed, created_at) VALUES (?, ?, false, ?)"
        )
        .bind(user_id)
        .bind(text)
        .bind(to_storage(&created_at))
        .execute(&mut *conn)
        .await?;

        Ok(Task {
            id: result.last_insert_rowid(),
            user_id,
            text: text.to_string(),
            completed: false,
            created_at,
            completed_at: None,
            deadline: None,
        })
    }

    /// Writes the mutable fields of an existing task back to the database.
    pub async fn save(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        let mut conn = pool.acquire().await?;
        self.save_with(&mut conn).await
    }

    /// Same as [`Task::save`], on a connection or open transaction.
    pub async fn save_with(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET completed = ?, completed_at = ?, deadline = ? WHERE id = ? AND user_id = ?"
        )
        .bind(self.completed)
        .bind(self.completed_at.as_ref().map(to_storage))
        .bind(self.deadline.as_ref().map(to_storage))
        .bind(self.id)
        .bind(self.user_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Loads every task of every user, in insertion order.
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskRow>(
            "SELECT id, user_id, text, completed, created_at, completed_at, deadline FROM tasks ORDER BY user_id, id"
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Task::try_from)
        .collect()
    }

    pub async fn find_by_user(pool: &SqlitePool, user_id: UserId) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TaskRow>(
            "SELECT id, user_id, text, completed, created_at, completed_at, deadline FROM tasks WHERE user_id = ? ORDER BY id"
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Task::try_from)
        .collect()
    }

    /// Deletes the completed tasks of one user together with any reminders
    /// still pointing at them, returning the deleted task ids.
    pub async fn delete_completed(pool: &SqlitePool, user_id: UserId) -> Result<Vec<TaskId>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM tasks WHERE user_id = ? AND completed = true ORDER BY id"
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM reminders WHERE user_id = ? AND task_id IN (SELECT id FROM tasks WHERE user_id = ? AND completed = true)"
        )
        .bind(user_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tasks WHERE user_id = ? AND completed = true")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ids)
    }
}
