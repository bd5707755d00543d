//! Entry point for the conversation layer: task and reminder operations
//! with the cross-cutting rules between them.

use chrono::{Duration, NaiveDateTime};
use std::sync::Arc;

use crate::database::connection::DatabaseManager;
use crate::database::models::{Reminder, Task, TaskId, UserId, UserProfile};
use crate::error::{TodoError, TodoResult};
use crate::services::reminder::{Notifier, ReconcileReport, ReminderScheduler};
use crate::services::task_store::{TaskFilter, TaskStore};
use crate::utils::datetime::{parse_time_expression, to_storage, Clock, ParseFailure};

pub const DEFAULT_REMINDER_LEAD_MINUTES: i64 = 30;

pub struct TodoService {
    db: Arc<DatabaseManager>,
    tasks: TaskStore,
    reminders: ReminderScheduler,
    clock: Arc<dyn Clock>,
    reminder_lead: Duration,
}

impl TodoService {
    pub async fn load(
        db: Arc<DatabaseManager>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> TodoResult<Self> {
        let tasks = TaskStore::load(db.clone(), clock.clone()).await?;
        let reminders = ReminderScheduler::new(db.clone(), notifier, clock.clone());

        Ok(Self {
            db,
            tasks,
            reminders,
            clock,
            reminder_lead: Duration::minutes(DEFAULT_REMINDER_LEAD_MINUTES),
        })
    }

    /// How long before a deadline a reminder fires when no time is given.
    pub fn with_reminder_lead(mut self, lead: Duration) -> Self {
        self.reminder_lead = lead;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.reminders
    }

    /// Records the chat user on first contact.
    pub async fn register_user(
        &self,
        user_id: UserId,
        username: Option<String>,
        full_name: Option<String>,
    ) -> TodoResult<UserProfile> {
        let created_at = to_storage(&self.clock.now());
        Ok(UserProfile::upsert(&self.db.pool, user_id, username, full_name, created_at).await?)
    }

    pub fn parse_time_expression(&self, phrase: &str) -> Result<NaiveDateTime, ParseFailure> {
        parse_time_expression(phrase, self.clock.now())
    }

    pub async fn add_task(&self, user_id: UserId, text: &str) -> TodoResult<Task> {
        self.tasks.add(user_id, text).await
    }

    /// Completing a task drops its pending reminders. The task update and
    /// the reminder rows are committed together or not at all.
    pub async fn toggle_task(&self, user_id: UserId, index: usize) -> TodoResult<Task> {
        self.tasks
            .toggle_with(user_id, index, |task| {
                if task.completed {
                    self.reminders.forget_task(user_id, task.id);
                }
            })
            .await
    }

    pub async fn set_deadline(
        &self,
        user_id: UserId,
        index: usize,
        deadline: Option<NaiveDateTime>,
    ) -> TodoResult<Task> {
        self.tasks.set_deadline(user_id, index, deadline).await
    }

    /// Returns how many tasks were removed.
    pub async fn clear_completed(&self, user_id: UserId) -> TodoResult<usize> {
        let removed = self.tasks.clear_completed(user_id).await?;
        for task in &removed {
            self.reminders.forget_task(user_id, task.id);
        }
        Ok(removed.len())
    }

    pub async fn list_tasks(&self, user_id: UserId, filter: TaskFilter) -> Vec<Task> {
        self.tasks.list(user_id, filter).await
    }

    pub async fn task_at(&self, user_id: UserId, index: usize) -> TodoResult<Task> {
        self.tasks.get(user_id, index).await
    }

    /// Where a task sits in the list now; `None` once it has been cleared.
    pub async fn task_index(&self, user_id: UserId, task_id: TaskId) -> Option<usize> {
        self.tasks.index_of(user_id, task_id).await
    }

    /// Schedules a reminder for the task currently at `index`, snapshotting
    /// its text.
    pub async fn schedule_reminder(
        &self,
        user_id: UserId,
        index: usize,
        fire_at: NaiveDateTime,
    ) -> TodoResult<Reminder> {
        self.schedule_for_open_task(user_id, index, |_| Ok(fire_at)).await
    }

    /// Schedules a reminder from a free-text time, falling back to the
    /// configured lead before the task deadline.
    pub async fn remind(&self, user_id: UserId, index: usize, phrase: Option<&str>) -> TodoResult<Reminder> {
        self.schedule_for_open_task(user_id, index, |task| self.resolve_reminder_time(task, phrase))
            .await
    }

    /// Holds the user's task list for the whole operation so a concurrent
    /// toggle cannot complete the task between the check and the insert.
    async fn schedule_for_open_task<F>(&self, user_id: UserId, index: usize, fire_at: F) -> TodoResult<Reminder>
    where
        F: FnOnce(&Task) -> TodoResult<NaiveDateTime>,
    {
        self.tasks
            .with_task(user_id, index, |task| async move {
                if task.completed {
                    return Err(TodoError::TaskCompleted { index });
                }
                let fire_at = fire_at(&task)?;
                self.reminders.schedule(user_id, task.id, fire_at, &task.text).await
            })
            .await
    }

    fn resolve_reminder_time(&self, task: &Task, phrase: Option<&str>) -> TodoResult<NaiveDateTime> {
        let parsed = phrase
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .and_then(|p| self.parse_time_expression(p).ok());

        match (parsed, task.deadline) {
            (Some(fire_at), _) => Ok(fire_at),
            (None, Some(deadline)) => deadline
                .checked_sub_signed(self.reminder_lead)
                .ok_or(TodoError::TimeNotRecognized),
            (None, None) => Err(TodoError::TimeNotRecognized),
        }
    }

    pub async fn cancel_reminder(&self, reminder_id: &str) -> TodoResult<bool> {
        self.reminders.cancel(reminder_id).await
    }

    pub async fn cancel_reminders_for_task(&self, user_id: UserId, index: usize) -> TodoResult<usize> {
        let task = self.tasks.get(user_id, index).await?;
        self.reminders.cancel_all_for_task(user_id, task.id).await
    }

    /// Pending reminders of one user, soonest first.
    pub fn list_reminders_for_user(&self, user_id: UserId) -> Vec<Reminder> {
        self.reminders.list_for_user(user_id)
    }

    pub async fn reconcile_on_startup(&self) -> TodoResult<ReconcileReport> {
        self.reminders.reconcile_on_startup(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::services::reminder::DeliveryFuture;
    use crate::utils::datetime::FixedClock;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    struct SilentNotifier;

    impl Notifier for SilentNotifier {
        fn deliver<'a>(&'a self, _reminder: &'a Reminder) -> DeliveryFuture<'a> {
            Box::pin(async { Ok::<(), DeliveryError>(()) })
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    async fn setup() -> (TodoService, Arc<FixedClock>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db_url = format!("sqlite:{}", dir.path().join("test.db").display());
        let db = Arc::new(DatabaseManager::new(&db_url).await.unwrap());
        db.run_migrations().await.unwrap();

        let clock = Arc::new(FixedClock::new(at(10, 0)));
        let service = TodoService::load(db, Arc::new(SilentNotifier), clock.clone())
            .await
            .unwrap();
        (service, clock, dir)
    }

    #[tokio::test]
    async fn test_completing_task_cancels_its_reminders() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "buy milk").await.unwrap();
        service.add_task(1, "call mom").await.unwrap();
        service.schedule_reminder(1, 0, at(11, 0)).await.unwrap();
        service.schedule_reminder(1, 1, at(11, 0)).await.unwrap();

        service.toggle_task(1, 0).await.unwrap();

        let pending = service.list_reminders_for_user(1);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task_text, "call mom");
    }

    #[tokio::test]
    async fn test_failed_completion_leaves_task_and_reminders_alone() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "buy milk").await.unwrap();
        service.schedule_reminder(1, 0, at(11, 0)).await.unwrap();

        sqlx::query("DROP TABLE reminders")
            .execute(&service.db.pool)
            .await
            .unwrap();

        let err = assert_err!(service.toggle_task(1, 0).await);
        assert!(matches!(err, TodoError::Persistence(_)));

        assert!(!service.task_at(1, 0).await.unwrap().completed);
        let stored = Task::find_by_user(&service.db.pool, 1).await.unwrap();
        assert!(!stored[0].completed);
        assert_eq!(stored[0].completed_at, None);
        assert_eq!(service.list_reminders_for_user(1).len(), 1);
    }

    #[tokio::test]
    async fn test_completion_deletes_reminder_rows() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "buy milk").await.unwrap();
        let reminder = assert_ok!(service.schedule_reminder(1, 0, at(11, 0)).await);

        assert_ok!(service.toggle_task(1, 0).await);

        assert!(!Reminder::exists(&service.db.pool, &reminder.id).await.unwrap());
        assert_eq!(service.scheduler().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_no_reminders_for_completed_task() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "buy milk").await.unwrap();
        service.set_deadline(1, 0, Some(at(18, 0))).await.unwrap();
        service.toggle_task(1, 0).await.unwrap();

        let err = assert_err!(service.schedule_reminder(1, 0, at(11, 0)).await);
        assert!(matches!(err, TodoError::TaskCompleted { index: 0 }));
        let err = assert_err!(service.remind(1, 0, None).await);
        assert!(matches!(err, TodoError::TaskCompleted { index: 0 }));

        assert!(service.list_reminders_for_user(1).is_empty());
        assert!(Reminder::find_by_user(&service.db.pool, 1).await.unwrap().is_empty());

        service.toggle_task(1, 0).await.unwrap();
        assert_ok!(service.schedule_reminder(1, 0, at(11, 0)).await);
    }

    #[tokio::test]
    async fn test_racing_toggle_and_schedule_never_leave_reminder_on_done_task() {
        let (service, _clock, _dir) = setup().await;
        for i in 0..20 {
            service.add_task(1, &format!("task {i}")).await.unwrap();
        }

        for index in 0..20 {
            let (toggled, _scheduled) = tokio::join!(
                service.toggle_task(1, index),
                service.schedule_reminder(1, index, at(11, 0)),
            );
            assert!(assert_ok!(toggled).completed);
        }

        assert!(service.list_reminders_for_user(1).is_empty());
        assert!(Reminder::find_by_user(&service.db.pool, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopening_task_does_not_restore_reminders() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "buy milk").await.unwrap();
        service.schedule_reminder(1, 0, at(11, 0)).await.unwrap();

        service.toggle_task(1, 0).await.unwrap();
        let reopened = service.toggle_task(1, 0).await.unwrap();

        assert!(!reopened.completed);
        assert!(service.list_reminders_for_user(1).is_empty());
    }

    #[tokio::test]
    async fn test_remind_defaults_to_lead_before_deadline() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "report").await.unwrap();
        service.set_deadline(1, 0, Some(at(18, 0))).await.unwrap();

        let reminder = service.remind(1, 0, None).await.unwrap();
        assert_eq!(reminder.fire_at, at(17, 30));

        let unparsable = service.remind(1, 0, Some("whenever")).await.unwrap();
        assert_eq!(unparsable.id, reminder.id);
    }

    #[tokio::test]
    async fn test_remind_prefers_parsed_time() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "report").await.unwrap();
        service.set_deadline(1, 0, Some(at(18, 0))).await.unwrap();

        let reminder = service.remind(1, 0, Some("in 2 hours")).await.unwrap();
        assert_eq!(reminder.fire_at, at(12, 0));
    }

    #[tokio::test]
    async fn test_remind_without_time_or_deadline_fails() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "someday").await.unwrap();

        assert!(matches!(service.remind(1, 0, None).await, Err(TodoError::TimeNotRecognized)));
        assert!(matches!(service.remind(1, 0, Some("later")).await, Err(TodoError::TimeNotRecognized)));
        assert!(matches!(service.remind(1, 3, None).await, Err(TodoError::TaskNotFound { index: 3 })));
    }

    #[tokio::test]
    async fn test_remind_for_imminent_deadline_is_not_in_future() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "soon").await.unwrap();
        service.set_deadline(1, 0, Some(at(10, 15))).await.unwrap();

        assert!(matches!(service.remind(1, 0, None).await, Err(TodoError::NotInFuture(_))));
    }

    #[tokio::test]
    async fn test_custom_reminder_lead() {
        let (service, _clock, _dir) = setup().await;
        let service = service.with_reminder_lead(Duration::hours(2));
        service.add_task(1, "report").await.unwrap();
        service.set_deadline(1, 0, Some(at(18, 0))).await.unwrap();

        assert_eq!(service.remind(1, 0, None).await.unwrap().fire_at, at(16, 0));
    }

    #[tokio::test]
    async fn test_snapshot_survives_task_changes() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "original").await.unwrap();
        let reminder = service.schedule_reminder(1, 0, at(12, 0)).await.unwrap();
        service.set_deadline(1, 0, Some(at(20, 0))).await.unwrap();

        assert_eq!(service.list_reminders_for_user(1)[0].task_text, "original");
        assert_eq!(reminder.task_text, "original");
    }

    #[tokio::test]
    async fn test_clear_completed_reports_count() {
        let (service, _clock, _dir) = setup().await;
        for text in ["a", "b", "c"] {
            service.add_task(1, text).await.unwrap();
        }
        assert_eq!(service.clear_completed(1).await.unwrap(), 0);

        service.toggle_task(1, 0).await.unwrap();
        service.toggle_task(1, 2).await.unwrap();
        assert_eq!(service.clear_completed(1).await.unwrap(), 2);

        let left = service.list_tasks(1, TaskFilter::All).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].text, "b");
    }

    #[tokio::test]
    async fn test_parse_uses_service_clock() {
        let (service, clock, _dir) = setup().await;
        assert_eq!(service.parse_time_expression("15:30"), Ok(at(15, 30)));

        clock.set(at(16, 0));
        assert_eq!(
            service.parse_time_expression("15:30"),
            Ok(at(15, 30) + Duration::days(1))
        );
        assert_eq!(service.parse_time_expression("today at 15:30"), Err(ParseFailure));
    }

    #[tokio::test]
    async fn test_register_user_refreshes_names() {
        let (service, _clock, _dir) = setup().await;
        let first = service
            .register_user(7, Some("old".to_string()), None)
            .await
            .unwrap();
        let second = service
            .register_user(7, Some("new".to_string()), Some("Ann Lee".to_string()))
            .await
            .unwrap();

        assert_eq!(second.username.as_deref(), Some("new"));
        assert_eq!(second.full_name.as_deref(), Some("Ann Lee"));
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_cancel_reminders_for_task_by_index() {
        let (service, _clock, _dir) = setup().await;
        service.add_task(1, "a").await.unwrap();
        service.schedule_reminder(1, 0, at(11, 0)).await.unwrap();
        service.schedule_reminder(1, 0, at(12, 0)).await.unwrap();

        assert_eq!(service.cancel_reminders_for_task(1, 0).await.unwrap(), 2);
        assert!(matches!(
            service.cancel_reminders_for_task(1, 5).await,
            Err(TodoError::TaskNotFound { index: 5 })
        ));
    }
}
