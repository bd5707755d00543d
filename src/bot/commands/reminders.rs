use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot::handlers::HandlerResult;
use crate::database::models::{Reminder, UserId};
use crate::services::todo::TodoService;
use crate::utils::datetime::format_timestamp;
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_start};
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::validation::split_task_argument;

/// Text delivered when a reminder fires.
pub fn reminder_message(reminder: &Reminder) -> String {
    format!("🔔 {} {}", bold("Reminder:"), escape_markdown(&reminder.task_text))
}

pub fn render_reminders(reminders: &[Reminder]) -> String {
    if reminders.is_empty() {
        return escape_markdown("🔕 No pending reminders. Use /remind <task number> [time] to add one.");
    }

    let mut text = format!("🔔 {}\n", bold(&format!("Pending reminders ({})", reminders.len())));
    for reminder in reminders {
        text.push_str(&format!(
            "\n• {} {}",
            escape_markdown(&format_timestamp(&reminder.fire_at)),
            escape_markdown(&format!("- {}", reminder.task_text))
        ));
    }
    text
}

/// `/remind <n> [time]`; `off` cancels the task's pending reminders.
pub async fn handle_remind(
    bot: Bot,
    msg: Message,
    args: String,
    service: Arc<TodoService>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    log_command_start("remind", &user.first_name, user_id, Some(&args));

    let (index, phrase) = match split_task_argument(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            feedback
                .validation_error(
                    &e.to_string(),
                    "Usage: /remind <task number> [time], for example /remind 2 in 30 minutes",
                )
                .await?;
            return Ok(());
        }
    };

    if phrase.is_some_and(|p| p.eq_ignore_ascii_case("off")) {
        match service.cancel_reminders_for_task(user_id, index).await {
            Ok(0) => feedback.info("That task has no pending reminders.").await?,
            Ok(count) => feedback.success(&format!("Cancelled {count} reminder(s).")).await?,
            Err(e) => {
                log_command_error("remind", user_id, e.code(), &e.to_string());
                feedback.todo_error(&e).await?
            }
        };
        return Ok(());
    }

    match service.remind(user_id, index, phrase).await {
        Ok(reminder) => {
            feedback
                .success(&format!(
                    "I'll remind you about '{}' at {}",
                    reminder.task_text,
                    format_timestamp(&reminder.fire_at)
                ))
                .await?;
        }
        Err(e) => {
            log_command_error("remind", user_id, e.code(), &e.to_string());
            feedback.todo_error(&e).await?;
        }
    }
    Ok(())
}

pub async fn handle_reminders(bot: Bot, msg: Message, service: Arc<TodoService>) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;
    log_command_start("reminders", &user.first_name, user_id, None);

    let reminders = service.list_reminders_for_user(user_id);
    bot.send_message(msg.chat.id, render_reminders(&reminders))
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    Ok(())
}
