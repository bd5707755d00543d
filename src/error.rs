use chrono::NaiveDateTime;
use thiserror::Error;

use crate::utils::datetime::format_timestamp;

/// Failures reported by the task store, the reminder scheduler and the
/// service built on top of them.
#[derive(Debug, Error)]
pub enum TodoError {
    #[error("Task text cannot be empty")]
    EmptyText,

    /// `index` is zero-based, as passed to the store.
    #[error("Task #{} not found", .index + 1)]
    TaskNotFound { index: usize },

    /// Completed tasks take no new reminders.
    #[error("Task #{} is already completed", .index + 1)]
    TaskCompleted { index: usize },

    #[error("Time {} is not in the future", format_timestamp(.0))]
    NotInFuture(NaiveDateTime),

    #[error("Time not recognized")]
    TimeNotRecognized,

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl TodoError {
    /// Stable machine-readable code for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            TodoError::EmptyText => "empty_text",
            TodoError::TaskNotFound { .. } => "task_not_found",
            TodoError::TaskCompleted { .. } => "task_completed",
            TodoError::NotInFuture(_) => "not_in_future",
            TodoError::TimeNotRecognized => "time_not_recognized",
            TodoError::Persistence(_) => "persistence",
        }
    }

    /// Validation failures are the caller's fault and safe to show verbatim.
    pub fn is_validation(&self) -> bool {
        !matches!(self, TodoError::Persistence(_))
    }
}

pub type TodoResult<T> = Result<T, TodoError>;

/// A reminder notification could not be delivered.
#[derive(Debug, Error)]
#[error("Failed to deliver reminder: {0}")]
pub struct DeliveryError(pub String);
