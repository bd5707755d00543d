use std::sync::Arc;
use teloxide::prelude::*;

use crate::bot::commands::list::send_list;
use crate::bot::commands::tasks::add_task;
use crate::bot::dialogue::{State, TodoDialogue, ASK_DEADLINE, ASK_REMINDER};
use crate::bot::handlers::HandlerResult;
use crate::database::models::UserId;
use crate::error::TodoError;
use crate::services::task_store::TaskFilter;
use crate::services::todo::TodoService;
use crate::utils::datetime::format_timestamp;
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_start};
use crate::utils::validation::{is_skip_answer, is_yes_answer};

/// Handles free text: dialogue answers, or a new task when idle.
pub async fn handle_general_message(
    bot: Bot,
    msg: Message,
    dialogue: TodoDialogue,
    state: State,
    service: Arc<TodoService>,
) -> HandlerResult {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;
    let feedback = CommandFeedback::new(bot.clone(), msg.chat.id);

    if text.starts_with('/') {
        let error_msg = format!("Unknown command: {}", text.split_whitespace().next().unwrap_or(text));
        feedback
            .validation_error(&error_msg, "Use /help to see all available commands.")
            .await?;
        return Ok(());
    }

    match state {
        State::Idle => {
            log_command_start("text", &user.first_name, user_id, None);
            if add_task(&feedback, &service, user_id, text).await?.is_some() {
                send_list(&bot, msg.chat.id, user_id, TaskFilter::All, &service).await?;
            }
        }
        State::WaitingForTask => {
            if let Some(task_id) = add_task(&feedback, &service, user_id, text).await? {
                dialogue.update(State::WaitingForDeadline { task_id }).await?;
                feedback.info(ASK_DEADLINE).await?;
            }
        }
        State::WaitingForDeadline { task_id } => {
            let Some(index) = service.task_index(user_id, task_id).await else {
                return abandon(&feedback, &dialogue).await;
            };

            if !is_skip_answer(text) {
                let Ok(deadline) = service.parse_time_expression(text) else {
                    feedback.todo_error(&TodoError::TimeNotRecognized).await?;
                    return Ok(());
                };
                match service.set_deadline(user_id, index, Some(deadline)).await {
                    Ok(_) => {
                        feedback
                            .success(&format!("Deadline set: {}", format_timestamp(&deadline)))
                            .await?;
                    }
                    Err(e) => {
                        log_command_error("deadline", user_id, e.code(), &e.to_string());
                        feedback.todo_error(&e).await?;
                        return Ok(());
                    }
                }
            }

            dialogue.update(State::WaitingForReminder { task_id }).await?;
            feedback.info(ASK_REMINDER).await?;
        }
        State::WaitingForReminder { task_id } => {
            let Some(index) = service.task_index(user_id, task_id).await else {
                return abandon(&feedback, &dialogue).await;
            };

            if !is_skip_answer(text) {
                let phrase = (!is_yes_answer(text)).then_some(text);
                match service.remind(user_id, index, phrase).await {
                    Ok(reminder) => {
                        feedback
                            .success(&format!("I'll remind you at {}", format_timestamp(&reminder.fire_at)))
                            .await?;
                    }
                    Err(e) => {
                        log_command_error("remind", user_id, e.code(), &e.to_string());
                        feedback.todo_error(&e).await?;
                        return Ok(());
                    }
                }
            }

            dialogue.exit().await?;
            send_list(&bot, msg.chat.id, user_id, TaskFilter::All, &service).await?;
        }
    }

    Ok(())
}

async fn abandon(feedback: &CommandFeedback, dialogue: &TodoDialogue) -> HandlerResult {
    dialogue.exit().await?;
    feedback.warning("That task no longer exists. Use /list to see your tasks.").await?;
    Ok(())
}
