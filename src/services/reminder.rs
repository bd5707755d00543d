//! Durable one-shot reminders.
//!
//! Pending reminders live in SQLite and in an in-memory registry ordered by
//! fire time. A single background task sleeps until the earliest entry and
//! is woken whenever the set changes.

use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};

use crate::database::connection::DatabaseManager;
use crate::database::models::{Reminder, TaskId, UserId};
use crate::error::{DeliveryError, TodoError, TodoResult};
use crate::utils::datetime::Clock;
use crate::utils::logging::log_reminder_event;

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Sends a due reminder to its owner.
pub trait Notifier: Send + Sync {
    fn deliver<'a>(&'a self, reminder: &'a Reminder) -> DeliveryFuture<'a>;
}

/// Outcome of `ReminderScheduler::reconcile_on_startup`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub rearmed: usize,
    pub discarded: usize,
}

#[derive(Default)]
struct Pending {
    by_id: HashMap<String, Reminder>,
    queue: BTreeSet<(NaiveDateTime, String)>,
    /// Claimed reminders whose delivery has not finished yet.
    firing: HashMap<String, Reminder>,
}

impl Pending {
    fn arm(&mut self, reminder: Reminder) {
        self.queue.insert((reminder.fire_at, reminder.id.clone()));
        self.by_id.insert(reminder.id.clone(), reminder);
    }

    fn take(&mut self, id: &str) -> Option<Reminder> {
        let reminder = self.by_id.remove(id)?;
        self.queue.remove(&(reminder.fire_at, reminder.id.clone()));
        Some(reminder)
    }

    fn claim(&mut self, id: &str) -> Option<Reminder> {
        let reminder = self.take(id)?;
        self.firing.insert(reminder.id.clone(), reminder.clone());
        Some(reminder)
    }

    /// The armed or in-flight reminder with this id.
    fn known(&self, id: &str) -> Option<&Reminder> {
        self.by_id.get(id).or_else(|| self.firing.get(id))
    }
}

struct Inner {
    db: Arc<DatabaseManager>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    pending: Mutex<Pending>,
    changed: Notify,
    shutdown: Notify,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_due(&self) -> Option<(NaiveDateTime, String)> {
        self.pending().queue.first().cloned()
    }

    /// Takes the reminder out of the registry; afterwards cancel() is a no-op.
    fn claim(&self, id: &str) -> Option<Reminder> {
        self.pending().claim(id)
    }

    async fn deliver(&self, reminder: Reminder) {
        match self.notifier.deliver(&reminder).await {
            Ok(()) => log_reminder_event("delivered", &reminder.id, reminder.user_id, None),
            Err(e) => tracing::warn!(
                "Reminder {} for user {} could not be delivered: {}",
                reminder.id, reminder.user_id, e
            ),
        }

        if let Err(e) = Reminder::delete(&self.db.pool, &reminder.id).await {
            tracing::error!("Failed to remove fired reminder {}: {}", reminder.id, e);
        }
        self.pending().firing.remove(&reminder.id);
    }
}

pub struct ReminderScheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(db: Arc<DatabaseManager>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                notifier,
                clock,
                pending: Mutex::new(Pending::default()),
                changed: Notify::new(),
                shutdown: Notify::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the wake-up loop. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut worker = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if worker.is_some() {
            return;
        }

        let inner = self.inner.clone();
        *worker = Some(tokio::spawn(run(inner)));
        tracing::info!("Reminder scheduler started with {} pending reminders", self.pending_count());
    }

    /// Stops the wake-up loop after the deliveries already in progress
    /// have finished.
    pub async fn stop(&self) {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            self.inner.shutdown.notify_one();
            if let Err(e) = handle.await {
                tracing::warn!("Reminder scheduler stopped abnormally: {}", e);
            }
            tracing::info!("Reminder scheduler stopped");
        }
    }

    /// Registers a reminder for `task_id`, persisting it before returning.
    ///
    /// Scheduling the same user, task and fire time again returns the
    /// existing reminder, including one that is being delivered right now.
    pub async fn schedule(
        &self,
        user_id: UserId,
        task_id: TaskId,
        fire_at: NaiveDateTime,
        task_text: &str,
    ) -> TodoResult<Reminder> {
        let now = self.inner.clock.now();
        if fire_at <= now {
            return Err(TodoError::NotInFuture(fire_at));
        }

        let id = Reminder::derive_id(user_id, task_id, &fire_at);
        if let Some(existing) = self.inner.pending().known(&id).cloned() {
            return Ok(existing);
        }

        let reminder = Reminder {
            id,
            user_id,
            task_id,
            fire_at,
            task_text: task_text.to_string(),
            created_at: now,
        };
        reminder.insert(&self.inner.db.pool).await?;

        self.inner.pending().arm(reminder.clone());
        self.inner.changed.notify_one();

        log_reminder_event("scheduled", &reminder.id, user_id, Some(&fire_at.to_string()));
        Ok(reminder)
    }

    /// Returns `false` when the reminder is unknown or already firing.
    pub async fn cancel(&self, reminder_id: &str) -> TodoResult<bool> {
        if !self.inner.pending().by_id.contains_key(reminder_id) {
            return Ok(false);
        }

        Reminder::delete(&self.inner.db.pool, reminder_id).await?;

        let removed = self.inner.pending().take(reminder_id);
        match removed {
            Some(reminder) => {
                self.inner.changed.notify_one();
                log_reminder_event("cancelled", &reminder.id, reminder.user_id, None);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops every reminder pointing at the given task.
    pub async fn cancel_all_for_task(&self, user_id: UserId, task_id: TaskId) -> TodoResult<usize> {
        Reminder::delete_for_task(&self.inner.db.pool, user_id, task_id).await?;
        Ok(self.forget_task(user_id, task_id))
    }

    /// Disarms the task's reminders without touching the database, for
    /// callers that already deleted the rows in their own transaction.
    pub fn forget_task(&self, user_id: UserId, task_id: TaskId) -> usize {
        let removed = {
            let mut pending = self.inner.pending();
            let ids: Vec<String> = pending
                .by_id
                .values()
                .filter(|r| r.user_id == user_id && r.task_id == task_id)
                .map(|r| r.id.clone())
                .collect();
            ids.iter().filter(|id| pending.take(id).is_some()).count()
        };

        if removed > 0 {
            self.inner.changed.notify_one();
            tracing::debug!("Cancelled {} reminders for task {} of user {}", removed, task_id, user_id);
        }
        removed
    }

    /// Delivers a reminder now and removes it. Returns `false` if it was
    /// already gone.
    pub async fn fire(&self, reminder_id: &str) -> bool {
        let Some(reminder) = self.inner.claim(reminder_id) else {
            return false;
        };
        self.inner.changed.notify_one();
        self.inner.deliver(reminder).await;
        true
    }

    /// Re-arms persisted reminders that are still ahead of `now` and deletes
    /// the ones that were missed while the process was down.
    pub async fn reconcile_on_startup(&self, now: NaiveDateTime) -> TodoResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for reminder in Reminder::find_all(&self.inner.db.pool).await? {
            if reminder.fire_at > now {
                self.inner.pending().arm(reminder);
                report.rearmed += 1;
            } else {
                Reminder::delete(&self.inner.db.pool, &reminder.id).await?;
                log_reminder_event("discarded", &reminder.id, reminder.user_id, Some("missed while offline"));
                report.discarded += 1;
            }
        }

        self.inner.changed.notify_one();
        tracing::info!(
            "Reminder reconciliation: {} re-armed, {} discarded",
            report.rearmed, report.discarded
        );
        Ok(report)
    }

    pub fn list_for_user(&self, user_id: UserId) -> Vec<Reminder> {
        let pending = self.inner.pending();
        pending
            .queue
            .iter()
            .filter_map(|(_, id)| pending.by_id.get(id))
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending().by_id.len()
    }
}

async fn run(inner: Arc<Inner>) {
    let mut deliveries = JoinSet::new();

    loop {
        let next = inner.next_due();
        let delay = next
            .as_ref()
            .and_then(|(fire_at, _)| (*fire_at - inner.clock.now()).to_std().ok())
            .unwrap_or_default();

        tokio::select! {
            _ = inner.shutdown.notified() => break,
            _ = inner.changed.notified() => continue,
            Some(result) = deliveries.join_next(), if !deliveries.is_empty() => {
                log_delivery_outcome(result);
            }
            _ = tokio::time::sleep(delay), if next.is_some() => {
                if let Some(reminder) = next.and_then(|(_, id)| inner.claim(&id)) {
                    let inner = inner.clone();
                    deliveries.spawn(async move { inner.deliver(reminder).await });
                }
            }
        }
    }

    if !deliveries.is_empty() {
        tracing::info!("Waiting for {} reminder deliveries to finish", deliveries.len());
    }
    while let Some(result) = deliveries.join_next().await {
        log_delivery_outcome(result);
    }
}

fn log_delivery_outcome(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::warn!("Reminder delivery task failed: {}", e);
    }
}
