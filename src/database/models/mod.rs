pub mod task;
pub mod reminder;
pub mod user;

pub use task::*;
pub use reminder::*;
pub use user::*;

/// Telegram user id; every task and reminder is partitioned by it.
pub type UserId = i64;
/// Stable task identifier, never reused.
pub type TaskId = i64;
