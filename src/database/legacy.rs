//! Import of the JSON task file written by earlier versions of the bot.
//!
//! The file maps a user id (as a string) to that user's ordered task list:
//!
//! ```json
//! {"42": [{"text": "buy milk", "completed": true,
//!          "created_at": "2024-06-01 09:15", "completed_at": "2024-06-01 18:40"}]}
//! ```

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use super::models::UserId;
use crate::utils::datetime::to_storage;

const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Deserialize)]
struct LegacyTask {
    text: String,
    #[serde(default)]
    completed: bool,
    created_at: String,
    #[serde(default)]
    completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTask {
    pub user_id: UserId,
    pub text: String,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub users: usize,
    pub imported: usize,
    pub skipped: usize,
}

fn parse_legacy_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), LEGACY_TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid timestamp '{raw}'"))
}

/// Parses the legacy file, returning tasks in per-user list order and the
/// number of entries that had to be skipped.
pub fn parse_legacy_tasks(json: &str) -> Result<(Vec<ImportedTask>, usize)> {
    // BTreeMap keeps the import order stable across runs
    let raw: BTreeMap<String, Vec<LegacyTask>> =
        serde_json::from_str(json).context("legacy file is not a valid task map")?;

    let mut tasks = Vec::new();
    let mut skipped = 0;

    for (user_key, entries) in raw {
        let user_id: UserId = user_key
            .trim()
            .parse()
            .map_err(|_| anyhow!("'{}' is not a user id", user_key))?;

        for entry in entries {
            let text = entry.text.trim();
            if text.is_empty() {
                tracing::warn!("Skipping blank task for user {}", user_id);
                skipped += 1;
                continue;
            }

            let created_at = parse_legacy_timestamp(&entry.created_at)?;
            let completed_at = match (entry.completed, entry.completed_at.as_deref()) {
                (false, _) => None,
                (true, Some(raw)) => Some(parse_legacy_timestamp(raw)?),
                (true, None) => Some(created_at),
            };

            tasks.push(ImportedTask {
                user_id,
                text: text.to_string(),
                completed: entry.completed,
                created_at,
                completed_at,
            });
        }
    }

    Ok((tasks, skipped))
}

/// Appends the legacy tasks to the `tasks` table in one transaction.
pub async fn import_legacy_tasks(pool: &SqlitePool, json: &str) -> Result<ImportReport> {
    let (tasks, skipped) = parse_legacy_tasks(json)?;

    let mut tx = pool.begin().await?;
    for task in &tasks {
        sqlx::query(
            "INSERT INTO tasks (user_id, text, completed, created_at, completed_at) VALUES (?, ?, ?, ?, ?)"
        )
        .bind(task.user_id)
        .bind(&task.text)
        .bind(task.completed)
        .bind(to_storage(&task.created_at))
        .bind(task.completed_at.as_ref().map(to_storage))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let mut users: Vec<UserId> = tasks.iter().map(|t| t.user_id).collect();
    users.dedup();

    Ok(ImportReport {
        users: users.len(),
        imported: tasks.len(),
        skipped,
    })
}
