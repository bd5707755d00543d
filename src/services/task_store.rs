//! Per-user task lists kept in memory and written through to SQLite.
//!
//! Every mutation is committed to the database before the in-memory list is
//! touched, so a failed write leaves both copies as they were.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::database::connection::DatabaseManager;
use crate::database::models::{Reminder, Task, TaskId, UserId};
use crate::error::{TodoError, TodoResult};
use crate::utils::datetime::Clock;
use crate::utils::logging::{log_store_error, log_store_operation};

/// Which tasks `TaskStore::list` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    All,
    Active,
    Completed,
    /// Open tasks with a deadline, soonest first.
    WithDeadline,
}

type UserTasks = Arc<AsyncMutex<Vec<Task>>>;

pub struct TaskStore {
    db: Arc<DatabaseManager>,
    clock: Arc<dyn Clock>,
    users: Mutex<HashMap<UserId, UserTasks>>,
}

impl TaskStore {
    /// Builds the store from everything already persisted.
    pub async fn load(db: Arc<DatabaseManager>, clock: Arc<dyn Clock>) -> TodoResult<Self> {
        let mut by_user: HashMap<UserId, Vec<Task>> = HashMap::new();
        for task in Task::find_all(&db.pool).await? {
            by_user.entry(task.user_id).or_default().push(task);
        }

        tracing::info!("Loaded tasks for {} users", by_user.len());

        let users = by_user
            .into_iter()
            .map(|(user_id, tasks)| (user_id, Arc::new(AsyncMutex::new(tasks))))
            .collect();

        Ok(Self {
            db,
            clock,
            users: Mutex::new(users),
        })
    }

    fn user_tasks(&self, user_id: UserId) -> UserTasks {
        let mut users = match self.users.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.entry(user_id).or_default().clone()
    }

    pub async fn add(&self, user_id: UserId, text: &str) -> TodoResult<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TodoError::EmptyText);
        }

        let tasks = self.user_tasks(user_id);
        let mut tasks = tasks.lock().await;

        let mut conn = self.db.pool.acquire().await?;
        let task = Task::insert(&mut conn, user_id, text, self.clock.now())
            .await
            .map_err(|e| {
                log_store_error("add", user_id, &e.to_string());
                e
            })?;

        tasks.push(task.clone());
        log_store_operation("add", user_id, Some(&format!("task {}", task.id)));
        Ok(task)
    }

    /// Flips completion of the task at `index` (zero-based).
    pub async fn toggle(&self, user_id: UserId, index: usize) -> TodoResult<Task> {
        self.toggle_with(user_id, index, |_| {}).await
    }

    /// Like [`TaskStore::toggle`], running `after_commit` on the new task
    /// while the user's list is still locked.
    ///
    /// Completing a task deletes its persisted reminders in the same
    /// transaction as the task update.
    pub async fn toggle_with<F>(&self, user_id: UserId, index: usize, after_commit: F) -> TodoResult<Task>
    where
        F: FnOnce(&Task),
    {
        let tasks = self.user_tasks(user_id);
        let mut tasks = tasks.lock().await;

        let updated = tasks
            .get(index)
            .ok_or(TodoError::TaskNotFound { index })?
            .toggled(self.clock.now());

        self.commit_toggle(&updated).await.map_err(|e| {
            log_store_error("toggle", user_id, &e.to_string());
            e
        })?;

        tasks[index] = updated.clone();
        after_commit(&updated);
        log_store_operation("toggle", user_id, Some(&format!("task {} at #{}", updated.id, index + 1)));
        Ok(updated)
    }

    async fn commit_toggle(&self, task: &Task) -> Result<(), sqlx::Error> {
        let mut tx = self.db.pool.begin().await?;
        task.save_with(&mut *tx).await?;
        if task.completed {
            Reminder::delete_for_task_with(&mut *tx, task.user_id, task.id).await?;
        }
        tx.commit().await
    }

    /// Replaces (or clears) the deadline of the task at `index`.
    pub async fn set_deadline(
        &self,
        user_id: UserId,
        index: usize,
        deadline: Option<NaiveDateTime>,
    ) -> TodoResult<Task> {
        self.update_at(user_id, index, "set_deadline", |task| Task {
            deadline,
            ..task.clone()
        })
        .await
    }

    async fn update_at<F>(&self, user_id: UserId, index: usize, operation: &str, change: F) -> TodoResult<Task>
    where
        F: FnOnce(&Task) -> Task,
    {
        let tasks = self.user_tasks(user_id);
        let mut tasks = tasks.lock().await;

        let current = tasks.get(index).ok_or(TodoError::TaskNotFound { index })?;
        let updated = change(current);

        updated.save(&self.db.pool).await.map_err(|e| {
            log_store_error(operation, user_id, &e.to_string());
            e
        })?;

        tasks[index] = updated.clone();
        log_store_operation(operation, user_id, Some(&format!("task {} at #{}", updated.id, index + 1)));
        Ok(updated)
    }

    /// Removes every completed task, returning the removed tasks.
    pub async fn clear_completed(&self, user_id: UserId) -> TodoResult<Vec<Task>> {
        let tasks = self.user_tasks(user_id);
        let mut tasks = tasks.lock().await;

        if !tasks.iter().any(|task| task.completed) {
            return Ok(Vec::new());
        }

        Task::delete_completed(&self.db.pool, user_id).await.map_err(|e| {
            log_store_error("clear_completed", user_id, &e.to_string());
            e
        })?;

        let (removed, kept): (Vec<Task>, Vec<Task>) = tasks.drain(..).partition(|task| task.completed);
        *tasks = kept;

        log_store_operation("clear_completed", user_id, Some(&format!("{} removed", removed.len())));
        Ok(removed)
    }

    pub async fn list(&self, user_id: UserId, filter: TaskFilter) -> Vec<Task> {
        let tasks = self.user_tasks(user_id);
        let tasks = tasks.lock().await;

        match filter {
            TaskFilter::All => tasks.clone(),
            TaskFilter::Active => tasks.iter().filter(|t| !t.completed).cloned().collect(),
            TaskFilter::Completed => tasks.iter().filter(|t| t.completed).cloned().collect(),
            TaskFilter::WithDeadline => {
                let mut with_deadline: Vec<Task> = tasks
                    .iter()
                    .filter(|t| !t.completed && t.deadline.is_some())
                    .cloned()
                    .collect();
                with_deadline.sort_by_key(|t| t.deadline);
                with_deadline
            }
        }
    }

    pub async fn get(&self, user_id: UserId, index: usize) -> TodoResult<Task> {
        let tasks = self.user_tasks(user_id);
        let tasks = tasks.lock().await;
        tasks.get(index).cloned().ok_or(TodoError::TaskNotFound { index })
    }

    /// Runs `f` on a copy of the task at `index` with the user's list
    /// locked, so no mutation of that list interleaves with it.
    pub async fn with_task<T, F, Fut>(&self, user_id: UserId, index: usize, f: F) -> TodoResult<T>
    where
        F: FnOnce(Task) -> Fut,
        Fut: Future<Output = TodoResult<T>>,
    {
        let tasks = self.user_tasks(user_id);
        let tasks = tasks.lock().await;

        let task = tasks.get(index).cloned().ok_or(TodoError::TaskNotFound { index })?;
        f(task).await
    }

    /// Looks a task up by its stable id.
    pub async fn find(&self, user_id: UserId, task_id: TaskId) -> Option<Task> {
        let tasks = self.user_tasks(user_id);
        let tasks = tasks.lock().await;
        tasks.iter().find(|t| t.id == task_id).cloned()
    }

    /// Current list position of a task, if it still exists.
    pub async fn index_of(&self, user_id: UserId, task_id: TaskId) -> Option<usize> {
        let tasks = self.user_tasks(user_id);
        let tasks = tasks.lock().await;
        tasks.iter().position(|t| t.id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::datetime::FixedClock;
    use chrono::{Duration, NaiveDate};
    use tempfile::TempDir;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    async fn setup_store() -> (TaskStore, Arc<DatabaseManager>, Arc<FixedClock>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db_url = format!("sqlite:{}", dir.path().join("test.db").display());
        let db = Arc::new(DatabaseManager::new(&db_url).await.unwrap());
        db.run_migrations().await.unwrap();

        let clock = Arc::new(FixedClock::new(noon()));
        let store = TaskStore::load(db.clone(), clock.clone()).await.unwrap();
        (store, db, clock, dir)
    }

    #[tokio::test]
    async fn test_add_rejects_blank_text() {
        let (store, _db, _clock, _dir) = setup_store().await;

        assert!(matches!(store.add(1, "").await, Err(TodoError::EmptyText)));
        assert!(matches!(store.add(1, "  \t\n").await, Err(TodoError::EmptyText)));
        assert!(store.list(1, TaskFilter::All).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_trims_and_stamps() {
        let (store, _db, _clock, _dir) = setup_store().await;

        let task = store.add(1, "  buy milk  ").await.unwrap();
        assert_eq!(task.text, "buy milk");
        assert!(!task.completed);
        assert_eq!(task.created_at, noon());
        assert_eq!(task.completed_at, None);
        assert_eq!(task.deadline, None);
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let (store, _db, clock, _dir) = setup_store().await;
        store.add(1, "buy milk").await.unwrap();

        clock.advance(Duration::minutes(5));
        let done = store.toggle(1, 0).await.unwrap();
        assert!(done.completed);
        assert_eq!(done.completed_at, Some(noon() + Duration::minutes(5)));

        let undone = store.toggle(1, 0).await.unwrap();
        assert!(!undone.completed);
        assert_eq!(undone.completed_at, None);
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_not_found() {
        let (store, _db, _clock, _dir) = setup_store().await;
        store.add(1, "only task").await.unwrap();

        assert!(matches!(store.toggle(1, 1).await, Err(TodoError::TaskNotFound { index: 1 })));
        assert!(matches!(store.set_deadline(1, 7, None).await, Err(TodoError::TaskNotFound { index: 7 })));
        assert!(matches!(store.toggle(2, 0).await, Err(TodoError::TaskNotFound { index: 0 })));
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let (store, _db, _clock, _dir) = setup_store().await;
        store.add(1, "mine").await.unwrap();
        store.add(2, "theirs").await.unwrap();

        store.toggle(2, 0).await.unwrap();

        let mine = store.list(1, TaskFilter::All).await;
        assert_eq!(mine.len(), 1);
        assert!(!mine[0].completed);
        assert_eq!(store.list(2, TaskFilter::Completed).await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_completed_keeps_order() {
        let (store, _db, _clock, _dir) = setup_store().await;
        for text in ["a", "b", "c", "d", "e"] {
            store.add(1, text).await.unwrap();
        }
        store.toggle(1, 1).await.unwrap();
        store.toggle(1, 3).await.unwrap();

        let removed = store.clear_completed(1).await.unwrap();
        let removed: Vec<&str> = removed.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(removed, vec!["b", "d"]);

        let left: Vec<String> = store.list(1, TaskFilter::All).await.into_iter().map(|t| t.text).collect();
        assert_eq!(left, vec!["a", "c", "e"]);

        assert!(store.clear_completed(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_filter_sorted() {
        let (store, _db, _clock, _dir) = setup_store().await;
        for text in ["late", "none", "soon", "done"] {
            store.add(1, text).await.unwrap();
        }
        store.set_deadline(1, 0, Some(noon() + Duration::days(3))).await.unwrap();
        store.set_deadline(1, 2, Some(noon() + Duration::hours(1))).await.unwrap();
        store.set_deadline(1, 3, Some(noon() + Duration::minutes(1))).await.unwrap();
        store.toggle(1, 3).await.unwrap();

        let texts: Vec<String> = store
            .list(1, TaskFilter::WithDeadline)
            .await
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["soon", "late"]);

        let active = store.list(1, TaskFilter::Active).await;
        assert_eq!(active.len(), 3);
    }

    #[tokio::test]
    async fn test_mutations_survive_reload() {
        let (store, db, clock, _dir) = setup_store().await;
        store.add(1, "first").await.unwrap();
        store.add(1, "second").await.unwrap();
        store.toggle(1, 0).await.unwrap();
        store.set_deadline(1, 1, Some(noon() + Duration::hours(2))).await.unwrap();

        let reloaded = TaskStore::load(db, clock).await.unwrap();
        let tasks = reloaded.list(1, TaskFilter::All).await;
        assert_eq!(tasks, store.list(1, TaskFilter::All).await);
        assert!(tasks[0].completed && tasks[0].completed_at.is_some());
        assert_eq!(tasks[1].deadline, Some(noon() + Duration::hours(2)));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let (store, db, _clock, _dir) = setup_store().await;
        store.add(1, "keep me").await.unwrap();

        db.pool.close().await;

        assert!(matches!(store.toggle(1, 0).await, Err(TodoError::Persistence(_))));
        assert!(matches!(store.add(1, "lost").await, Err(TodoError::Persistence(_))));

        let tasks = store.list(1, TaskFilter::All).await;
        assert_eq!(tasks.len(), 1);
        assert!(!tasks[0].completed);
    }

    #[tokio::test]
    async fn test_completion_and_reminder_rows_commit_together() {
        let (store, db, _clock, _dir) = setup_store().await;
        let task = store.add(1, "buy milk").await.unwrap();
        let reminder = Reminder {
            id: Reminder::derive_id(1, task.id, &(noon() + Duration::hours(1))),
            user_id: 1,
            task_id: task.id,
            fire_at: noon() + Duration::hours(1),
            task_text: task.text.clone(),
            created_at: noon(),
        };
        reminder.insert(&db.pool).await.unwrap();

        let mut seen = None;
        let done = store.toggle_with(1, 0, |t| seen = Some(t.id)).await.unwrap();
        assert!(done.completed);
        assert_eq!(seen, Some(task.id));
        assert!(!Reminder::exists(&db.pool, &reminder.id).await.unwrap());

        // Reopening leaves other rows alone
        reminder.insert(&db.pool).await.unwrap();
        store.toggle(1, 0).await.unwrap();
        assert!(Reminder::exists(&db.pool, &reminder.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle_rolls_back_when_reminder_delete_fails() {
        let (store, db, _clock, _dir) = setup_store().await;
        store.add(1, "buy milk").await.unwrap();
        sqlx::query("DROP TABLE reminders").execute(&db.pool).await.unwrap();

        let mut called = false;
        let result = store.toggle_with(1, 0, |_| called = true).await;

        assert!(matches!(result, Err(TodoError::Persistence(_))));
        assert!(!called);
        assert!(!store.get(1, 0).await.unwrap().completed);
        assert!(!Task::find_by_user(&db.pool, 1).await.unwrap()[0].completed);
    }

    #[tokio::test]
    async fn test_with_task_sees_current_task() {
        let (store, _db, _clock, _dir) = setup_store().await;
        store.add(1, "first").await.unwrap();

        let text = store
            .with_task(1, 0, |task| async move { Ok(task.text) })
            .await
            .unwrap();
        assert_eq!(text, "first");

        let missing = store.with_task(1, 4, |task| async move { Ok(task.id) }).await;
        assert!(matches!(missing, Err(TodoError::TaskNotFound { index: 4 })));
    }

    #[tokio::test]
    async fn test_find_by_stable_id() {
        let (store, _db, _clock, _dir) = setup_store().await;
        let first = store.add(1, "first").await.unwrap();
        let second = store.add(1, "second").await.unwrap();
        assert_ne!(first.id, second.id);

        assert_eq!(store.find(1, second.id).await, Some(second.clone()));
        assert_eq!(store.find(2, second.id).await, None);
        assert_eq!(store.get(1, 1).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_index_of_follows_clear() {
        let (store, _db, _clock, _dir) = setup_store().await;
        store.add(1, "done").await.unwrap();
        let open = store.add(1, "open").await.unwrap();
        assert_eq!(store.index_of(1, open.id).await, Some(1));

        store.toggle(1, 0).await.unwrap();
        store.clear_completed(1).await.unwrap();
        assert_eq!(store.index_of(1, open.id).await, Some(0));
        assert_eq!(store.index_of(2, open.id).await, None);
    }
}
