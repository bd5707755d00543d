use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot::commands::list::build_list_view;
use crate::bot::dialogue::{State, TodoDialogue, ASK_TASK_TEXT};
use crate::bot::handlers::HandlerResult;
use crate::database::models::UserId;
use crate::error::TodoError;
use crate::services::task_store::TaskFilter;
use crate::services::todo::TodoService;
use crate::utils::logging::{log_command_error, log_command_start};

/// Inline button payloads attached to the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// `task_{i}`: flip completion of the task at list index `i`.
    Toggle(usize),
    AddTask,
    ClearCompleted,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "add_task" => Some(Self::AddTask),
            "clear_completed" => Some(Self::ClearCompleted),
            _ => data
                .strip_prefix("task_")
                .and_then(|index| index.parse().ok())
                .map(Self::Toggle),
        }
    }

    pub fn to_data(self) -> String {
        match self {
            Self::Toggle(index) => format!("task_{index}"),
            Self::AddTask => "add_task".to_string(),
            Self::ClearCompleted => "clear_completed".to_string(),
        }
    }
}

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    dialogue: TodoDialogue,
    service: Arc<TodoService>,
) -> HandlerResult {
    let user_id = q.from.id.0 as UserId;
    let username = q.from.username.as_deref().unwrap_or("unknown");

    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        tracing::warn!("Unrecognized callback data {:?} from user {}", q.data, user_id);
        bot.answer_callback_query(q.id).text("Unknown action").await?;
        return Ok(());
    };

    log_command_start("callback", username, user_id, Some(&action.to_data()));

    match action {
        CallbackAction::Toggle(index) => {
            let answer = match service.toggle_task(user_id, index).await {
                Ok(task) if task.completed => "✅ Marked as done".to_string(),
                Ok(_) => "⭕ Marked as open".to_string(),
                Err(e) => {
                    log_command_error("toggle", user_id, e.code(), &e.to_string());
                    match e {
                        TodoError::TaskNotFound { .. } => "Task not found, the list was refreshed".to_string(),
                        other => format!("❌ {other}"),
                    }
                }
            };
            bot.answer_callback_query(q.id.clone()).text(answer).await?;
            refresh_list_message(&bot, &q, user_id, &service).await;
        }
        CallbackAction::AddTask => {
            dialogue.update(State::WaitingForTask).await?;
            bot.answer_callback_query(q.id.clone()).await?;
            if let Some(message) = q.message.as_ref() {
                bot.send_message(message.chat.id, ASK_TASK_TEXT).await?;
            }
        }
        CallbackAction::ClearCompleted => {
            let answer = match service.clear_completed(user_id).await {
                Ok(0) => "Nothing to clear".to_string(),
                Ok(removed) => format!("🧹 Removed {removed} completed task(s)"),
                Err(e) => {
                    log_command_error("clear", user_id, e.code(), &e.to_string());
                    format!("❌ {e}")
                }
            };
            bot.answer_callback_query(q.id.clone()).text(answer).await?;
            refresh_list_message(&bot, &q, user_id, &service).await;
        }
    }

    Ok(())
}

/// Redraws the list message the button belongs to.
async fn refresh_list_message(bot: &Bot, q: &CallbackQuery, user_id: UserId, service: &TodoService) {
    let Some(message) = q.message.as_ref() else {
        return;
    };

    let (text, keyboard) = build_list_view(service, user_id, TaskFilter::All).await;
    if let Err(e) = bot
        .edit_message_text(message.chat.id, message.id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(keyboard)
        .await
    {
        // Telegram refuses edits that leave the message unchanged.
        tracing::debug!("List message for user {} not updated: {}", user_id, e);
    }
}
