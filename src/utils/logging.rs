use tracing::{debug, error, info, warn};

use crate::database::models::UserId;

/// Logs command start with consistent format
pub fn log_command_start(command: &str, user: &str, user_id: UserId, details: Option<&str>) {
    match details {
        Some(d) => info!("CMD_START: {} by {}({}) - {}", command, user, user_id, d),
        None => info!("CMD_START: {} by {}({})", command, user, user_id),
    }
}

/// Logs command errors with consistent format
pub fn log_command_error(command: &str, user_id: UserId, code: &str, error: &str) {
    warn!("CMD_ERROR: {} by {} [{}] - {}", command, user_id, code, error);
}

/// Logs a successful task store write
pub fn log_store_operation(operation: &str, user_id: UserId, details: Option<&str>) {
    match details {
        Some(d) => debug!("STORE_OP: {} for user {} - {}", operation, user_id, d),
        None => debug!("STORE_OP: {} for user {}", operation, user_id),
    }
}

/// Logs a failed task store write
pub fn log_store_error(operation: &str, user_id: UserId, error: &str) {
    error!("STORE_ERROR: {} for user {} failed: {}", operation, user_id, error);
}

/// Logs reminder lifecycle transitions (scheduled, delivered, cancelled, discarded)
pub fn log_reminder_event(event: &str, reminder_id: &str, user_id: UserId, details: Option<&str>) {
    match details {
        Some(d) => info!("REMINDER: {} {} for user {} - {}", event, reminder_id, user_id, d),
        None => info!("REMINDER: {} {} for user {}", event, reminder_id, user_id),
    }
}

/// Logs system events with consistent format
pub fn log_system_event(event: &str, details: Option<&str>) {
    match details {
        Some(d) => info!("SYSTEM: {} - {}", event, d),
        None => info!("SYSTEM: {}", event),
    }
}
