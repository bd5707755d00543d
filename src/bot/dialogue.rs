use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

use crate::database::models::TaskId;

/// Where a chat is in the guided task creation flow.
///
/// Steps after the first hold the stable task id, so clearing or toggling
/// other tasks mid-dialogue does not redirect the answer to a different task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    WaitingForTask,
    WaitingForDeadline { task_id: TaskId },
    WaitingForReminder { task_id: TaskId },
}

pub type TodoDialogue = Dialogue<State, InMemStorage<State>>;

pub const ASK_TASK_TEXT: &str = "✏️ Send me the text of the new task.";
pub const ASK_DEADLINE: &str =
    "⏰ When is it due? For example: tomorrow at 18:00, in 3 days, 31.12.2024 23:59. Send 'skip' for no deadline.";
pub const ASK_REMINDER: &str =
    "🔔 Should I remind you? Send a time like 'in 2 hours', 'yes' for the default before the deadline, or 'skip'.";
