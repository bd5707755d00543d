pub mod health;
pub mod reminder;
pub mod task_store;
pub mod todo;
